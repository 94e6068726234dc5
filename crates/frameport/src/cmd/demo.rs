use std::cell::RefCell;
use std::rc::Rc;

use frameport_channel::{
    ChannelConfig, ChannelManager, HostConnection, RpcContext, HOST_CONTROL_INSTANCE_ID,
    INITIAL_HANDSHAKE_METHOD,
};
use frameport_core::{Completion, EventLoop, ObjectRef, Settlement, Value};
use frameport_transport::{BrowsingContext, SANDBOXED_ORIGIN};
use serde::Serialize;

use crate::cmd::DemoArgs;
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

const HOST_ORIGIN: &str = "https://host.example";
const EXTENSION_URL: &str = "https://extension.example/index.html";
const EXTENSION_ORIGIN: &str = "https://extension.example";
const CLOCK_INSTANCE_ID: &str = "demo.Clock";
const TICKS: i32 = 3;

#[derive(Serialize, Clone)]
struct Step {
    side: &'static str,
    event: &'static str,
    detail: String,
}

#[derive(Serialize)]
struct DemoOutput {
    schema_id: &'static str,
    sandboxed: bool,
    extension_origin: &'static str,
    parent_channel_origin: Option<String>,
    tasks_run: usize,
    steps: Vec<Step>,
}

type Transcript = Rc<RefCell<Vec<Step>>>;

fn record(transcript: &Transcript, side: &'static str, event: &'static str, detail: impl Into<String>) {
    transcript.borrow_mut().push(Step {
        side,
        event,
        detail: detail.into(),
    });
}

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let out = run_session(&args)?;
    print_output(&out, format);
    Ok(SUCCESS)
}

fn run_session(args: &DemoArgs) -> CliResult<DemoOutput> {
    let event_loop = EventLoop::new();
    let transcript: Transcript = Rc::new(RefCell::new(Vec::new()));

    let host = BrowsingContext::new(&event_loop, HOST_ORIGIN);
    let extension = if args.sandboxed {
        BrowsingContext::sandboxed(&event_loop)
    } else {
        BrowsingContext::new(&event_loop, EXTENSION_ORIGIN)
    };

    // Host side: knows the extension's URL and serves host control plus a clock.
    let host_manager = ChannelManager::with_envelope_validation(&RpcContext::with_event_loop(&event_loop))
        .map_err(|err| channel_error("envelope schema", err))?;
    host_manager.subscribe(&host);
    let host_channel = host_manager.add_channel(host.window_proxy(&extension), Some(EXTENSION_URL));
    host_channel
        .object_registry()
        .register(HOST_CONTROL_INSTANCE_ID, host_control(&transcript));
    host_channel
        .object_registry()
        .register(CLOCK_INSTANCE_ID, clock(&transcript));

    // Extension side: learns the host's origin from the first reply.
    let extension_manager = ChannelManager::new(&RpcContext::with_event_loop(&event_loop));
    extension_manager.subscribe(&extension);
    let connection = HostConnection::connect(
        &extension_manager,
        extension.window_proxy(&host),
        ChannelConfig::default(),
        Value::from_pairs([("extensionName", args.name.as_str())]),
    );
    record(&transcript, "extension", "connect", "sent initialHandshake");

    let handshake_transcript = transcript.clone();
    let clock_connection = connection.clone();
    let listener_transcript = transcript.clone();
    connection.handshake().map(move |reply| {
        let host_origin = reply.get("hostOrigin").as_str().unwrap_or("?").to_string();
        record(
            &handshake_transcript,
            "extension",
            "handshake",
            format!("host replied from {host_origin}"),
        );
        let listener = tick_listener(&listener_transcript);
        Ok(Completion::Pending(clock_connection.invoke_remote_method(
            "subscribe",
            CLOCK_INSTANCE_ID,
            vec![listener],
            None,
            None,
        )))
    });

    let tasks_run = event_loop.run_until_idle();
    tracing::debug!(tasks_run, "demo session drained");

    match connection.handshake().settlement() {
        Settlement::Fulfilled(_) => {}
        Settlement::Rejected(reason) => {
            return Err(CliError::new(
                FAILURE,
                format!(
                    "handshake rejected: {}",
                    reason.error_message().unwrap_or_else(|| "unknown error".to_string())
                ),
            ))
        }
        Settlement::Pending => {
            return Err(CliError::new(FAILURE, "handshake did not complete"));
        }
    }

    let steps = transcript.borrow().clone();
    Ok(DemoOutput {
        schema_id: "https://schemas.3leaps.dev/frameport/cli/v1/demo-session.schema.json",
        sandboxed: args.sandboxed,
        extension_origin: if args.sandboxed {
            SANDBOXED_ORIGIN
        } else {
            EXTENSION_ORIGIN
        },
        parent_channel_origin: connection.channel().target_origin(),
        tasks_run,
        steps,
    })
}

fn host_control(transcript: &Transcript) -> Value {
    let transcript = transcript.clone();
    Value::from_pairs([(
        INITIAL_HANDSHAKE_METHOD,
        Value::function(move |_, args| {
            let data = args.into_iter().next().unwrap_or_default();
            let name = data.get("extensionName").as_str().unwrap_or("?").to_string();
            record(&transcript, "host", "handshake", format!("extension {name} connected"));
            Ok(Completion::Ready(Value::from_pairs([
                ("hostOrigin", Value::from(HOST_ORIGIN)),
                ("extensionName", Value::from(name)),
            ])))
        }),
    )])
}

fn clock(transcript: &Transcript) -> Value {
    let transcript = transcript.clone();
    Value::from_pairs([(
        "subscribe",
        Value::function(move |_, args| {
            let listener = args.into_iter().next().unwrap_or_default();
            let Some(on_tick) = listener.get("onTick").as_function().cloned() else {
                return Err(Value::error("listener must provide onTick"));
            };
            let name = listener.get("name").as_str().unwrap_or("?").to_string();
            record(&transcript, "host", "subscribe", format!("listener {name} registered"));
            for tick in 1..=TICKS {
                on_tick.call(&Value::Undefined, vec![Value::from(tick)])?;
            }
            Ok(Completion::Ready(Value::from(TICKS)))
        }),
    )])
}

/// Listener object whose `onTick` runs on the extension side.
fn tick_listener(transcript: &Transcript) -> Value {
    let listener = ObjectRef::new();
    listener.set("name", "ticker");
    let transcript = transcript.clone();
    listener.set(
        "onTick",
        Value::function(move |this, args| {
            let tick = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            let name = this.get("name").as_str().unwrap_or("?").to_string();
            record(&transcript, "extension", "callback", format!("{name} received tick {tick}"));
            Ok(Completion::Ready(Value::Undefined))
        }),
    );
    Value::Object(listener)
}

fn print_output(out: &DemoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_table(
            &["SIDE", "EVENT", "DETAIL"],
            out.steps
                .iter()
                .map(|step| vec![step.side.to_string(), step.event.to_string(), step.detail.clone()])
                .collect(),
        ),
        OutputFormat::Pretty => {
            println!("Session:");
            println!("  Extension origin: {}", out.extension_origin);
            println!(
                "  Parent channel:   {}",
                out.parent_channel_origin.as_deref().unwrap_or("unbound")
            );
            println!("  Tasks run:        {}", out.tasks_run);
            for step in &out.steps {
                println!("  [{:<9}] {:<9} {}", step.side, step.event, step.detail);
            }
        }
    }
}

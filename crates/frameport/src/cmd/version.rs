use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("frameport {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: frameport");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol: {}", frameport_wire::PROTOCOL_VERSION);
    println!(
        "target: {}",
        option_env!("FRAMEPORT_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: schema={}, cli=true", cfg!(feature = "schema"));

    Ok(SUCCESS)
}

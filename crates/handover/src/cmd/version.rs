use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("handover {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let fields = vec![
        ("name", "handover".to_string()),
        ("version", env!("CARGO_PKG_VERSION").to_string()),
        (
            "target",
            option_env!("HANDOVER_BUILD_TARGET")
                .unwrap_or("unknown")
                .to_string(),
        ),
        ("target os", std::env::consts::OS.to_string()),
        ("target arch", std::env::consts::ARCH.to_string()),
        (
            "git hash",
            option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        ),
        (
            "features",
            format!("async={}, cli=true", cfg!(feature = "async")),
        ),
        (
            "default max payload",
            handover::marshal::DEFAULT_MAX_PAYLOAD.to_string(),
        ),
        (
            "default max chunk",
            handover::link::DEFAULT_MAX_CHUNK.to_string(),
        ),
    ];
    print_fields(fields, format);

    Ok(SUCCESS)
}

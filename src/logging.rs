// src/logging.rs

use log::LevelFilter;

/// True when `-v` or `--verbose` is on the command line.
pub fn verbose_requested(args: &[String]) -> bool {
    args.iter().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Arguments with the verbosity switch removed, for GTK's own parser.
pub fn strip_verbose(args: &[String]) -> Vec<String> {
    args.iter()
        .filter(|arg| !matches!(arg.as_str(), "-v" | "--verbose"))
        .cloned()
        .collect()
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`.
pub fn init(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            let level = if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            };
            builder.filter_level(LevelFilter::Warn);
            builder.filter_module("gpk_tools", level);
            builder.filter_module("gpk_repo", level);
            builder.filter_module("gpk_hardware", level);
        }
    }
    let _ = builder.try_init();
}

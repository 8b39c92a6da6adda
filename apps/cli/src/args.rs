use std::env;

#[derive(Debug, Default)]
pub struct CliArgs {
    pub port: Option<u16>,
}

pub fn parse_args() -> Result<CliArgs, String> {
    parse_from(env::args().skip(1))
}

fn parse_from(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --port".to_string())?;
                let port = value
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port value: {value}"))?;
                parsed.port = Some(port);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                return Err(format!("unknown argument: {arg}"));
            }
        }
    }

    Ok(parsed)
}

pub fn print_help() {
    println!(
        "Usage bridge\n\n\
Usage:\n  usage-bridge [--port <port>]\n\n\
Options:\n  --port <port>  Override the configured diagnostic port for this run only\n  -h, --help     Show this help message\n\n\
Environment:\n  API, COLLECTOR, SECURED, CF_TOKEN, SYSTEM_TOKEN, MIN_INTERVAL, MAX_INTERVAL,\n  GUID_MIN_AGE, SCAN_RETRY_INTERVAL, PAGE_SIZE, ORGS_TO_REPORT, DATA_DIR, RUST_LOG\n"
    );
}

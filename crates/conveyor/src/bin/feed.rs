use clap::{Arg, ArgAction, Command};
use conveyor::{Connector, ConnectorConfig, FramedFileSource, ReadMode, ThrottledFileSource};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("feed")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Feeds framed record files into a stream-processing engine, at least once")
        .arg(
            Arg::new("files")
                .help("Framed record files to stream, one stream per file")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .help("Engine host to connect to")
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("Engine port to connect to")
                .value_parser(clap::value_parser!(u16))
                .default_value("7100"),
        )
        .arg(
            Arg::new("cookie")
                .long("cookie")
                .help("Shared secret presented in the hello announcement")
                .default_value(""),
        )
        .arg(
            Arg::new("program")
                .long("program")
                .help("Program name presented in the hello announcement")
                .default_value("feed"),
        )
        .arg(
            Arg::new("instance")
                .long("instance")
                .help("Instance name presented in the hello announcement")
                .default_value("instance"),
        )
        .arg(
            Arg::new("limit_rate")
                .long("limit-rate")
                .help("Per-file byte rate cap in bytes/s")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("lines")
                .long("lines")
                .help("Treat files as newline-delimited text instead of framed records")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config = ConnectorConfig::new(
        matches.get_one::<String>("host").unwrap().clone(),
        *matches.get_one::<u16>("port").unwrap(),
        env!("CARGO_PKG_VERSION"),
        matches.get_one::<String>("cookie").unwrap().clone(),
        matches.get_one::<String>("program").unwrap().clone(),
        matches.get_one::<String>("instance").unwrap().clone(),
    );
    let files: Vec<String> = matches.get_many::<String>("files").unwrap().cloned().collect();
    let limit_rate = matches.get_one::<f64>("limit_rate").copied();
    let lines = matches.get_flag("lines");

    if let Err(err) = run(config, &files, limit_rate, lines) {
        error!(%err, "feed failed");
        std::process::exit(1);
    }
}

fn run(
    config: ConnectorConfig,
    files: &[String],
    limit_rate: Option<f64>,
    lines: bool,
) -> Result<(), conveyor::ConnectorError> {
    let mut client = Connector::new(config)?;
    client.connect()?;
    for file in files {
        match limit_rate {
            Some(rate) => {
                let mode = if lines { ReadMode::Lines } else { ReadMode::Framed };
                client.add_source(ThrottledFileSource::open(file, mode, rate)?)?;
            }
            None => {
                client.add_source(FramedFileSource::open(file)?)?;
            }
        }
    }

    // Reconnect and resume on transport drops; the engine repositions us.
    loop {
        match client.run() {
            Ok(()) => {
                info!("all sources exhausted and acknowledged");
                return Ok(());
            }
            Err(err) if err.is_disconnect() => {
                info!("session dropped, reconnecting");
                client.connect()?;
            }
            Err(err) => return Err(err),
        }
    }
}

use std::{env, path::Path, process, str::FromStr, time::Duration};

use epd_link::{
    imaging, ColorMode, Error, Panel, Policy, Progress, SessionConfig, TransferSession,
};

//
// cargo run -- send photo.jpg /dev/ttyUSB0
// cargo run -- dither photo.jpg out.png --mode rbw --policy red-priority
// cargo run -- test-pattern /dev/ttyUSB0
//

fn print_usage() {
    println!("Usage: epd-link <COMMAND> [ARGS]");
    println!("Commands:");
    println!("  send <image> [port]                 Dither, encode and upload an image");
    println!("  dither <input> <output> [options]   Dither only and save the result");
    println!("  test-pattern [port]                 Upload 256 byte ramp test planes");
    println!("Options:");
    println!("  --mode bw|rw|rbw                    Color mode (default $EPD_MODE or bw)");
    println!("  --policy nearest|red-priority       Dithering policy");
    println!("  --panel 2in7b|2in9b|4in2b|7in5b|WxH Target panel (default $EPD_PANEL or 2in9b)");
    println!("  --save <path>                       Save the dithered image when sending");
    println!("  --preview <path>                    Save the planes as the panel will show them");
    println!("\nEnvironment: EPD_PORT, EPD_BAUD, EPD_TIMEOUT_SECS, EPD_MODE, EPD_PANEL");
}

struct Options {
    positional: Vec<String>,
    mode: ColorMode,
    policy: Option<Policy>,
    panel: Panel,
    save: Option<String>,
    preview: Option<String>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, Error> {
        let mut options = Options {
            positional: Vec::new(),
            mode: env_or("EPD_MODE", ColorMode::default())?,
            policy: None,
            panel: env_or("EPD_PANEL", Panel::default())?,
            save: None,
            preview: None,
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--mode" => options.mode = value(&mut iter, arg)?.parse()?,
                "--policy" => options.policy = Some(value(&mut iter, arg)?.parse()?),
                "--panel" => options.panel = value(&mut iter, arg)?.parse()?,
                "--save" => options.save = Some(value(&mut iter, arg)?.to_string()),
                "--preview" => options.preview = Some(value(&mut iter, arg)?.to_string()),
                _ => options.positional.push(arg.clone()),
            }
        }
        Ok(options)
    }

    fn policy(&self) -> Policy {
        self.policy.unwrap_or_else(|| self.mode.default_policy())
    }
}

fn value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a str, Error> {
    iter.next()
        .map(|s| s.as_str())
        .ok_or_else(|| Error::InvalidArgument(format!("{} needs a value", flag)))
}

fn env_or<T: FromStr<Err = Error>>(key: &str, default: T) -> Result<T, Error> {
    match env::var(key) {
        Ok(value) => value.parse(),
        Err(_) => Ok(default),
    }
}

fn session_config(port: Option<&String>) -> Result<SessionConfig, Error> {
    let port = port
        .cloned()
        .or_else(|| env::var("EPD_PORT").ok())
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    let mut config = SessionConfig::new(port);
    if let Ok(baud) = env::var("EPD_BAUD") {
        config = config.baud_rate(parse_baud(&baud)?);
    }
    if let Ok(secs) = env::var("EPD_TIMEOUT_SECS") {
        config = config.timeout(parse_timeout(&secs)?);
    }
    Ok(config)
}

fn parse_baud(value: &str) -> Result<u32, Error> {
    match value.trim().parse::<u32>() {
        Ok(baud) if baud > 0 => Ok(baud),
        _ => Err(Error::InvalidArgument(format!(
            "EPD_BAUD must be a positive integer, got {:?}",
            value
        ))),
    }
}

fn parse_timeout(value: &str) -> Result<Duration, Error> {
    match value.trim().parse::<f64>() {
        Ok(secs) if secs >= 0.0 && secs < u64::MAX as f64 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(Error::InvalidArgument(format!(
            "EPD_TIMEOUT_SECS must be a non-negative number of seconds, got {:?}",
            value
        ))),
    }
}

fn upload(config: SessionConfig, primary: &[u8], secondary: &[u8]) -> Result<(), Error> {
    println!("Sending data to {}...", config.port());
    let mut session = TransferSession::open(config)?.on_progress(|p: &Progress| {
        use std::io::Write;
        print!(
            "\rSent {} {}/{} bytes ({:.1}%)",
            p.plane,
            p.sent,
            p.total,
            p.sent as f64 / p.total as f64 * 100.0
        );
        std::io::stdout().flush().ok();
        if p.sent == p.total {
            println!();
        }
    });
    session.send(primary, secondary)?;
    println!("Data sent successfully!");
    Ok(())
}

fn run(command: &str, options: Options) -> Result<(), Error> {
    match command {
        "send" => {
            let input = options.positional.get(0).ok_or_else(|| missing("image"))?;
            println!("[1/3] Applying dithering...");
            let source = imaging::load(Path::new(input), options.panel)?;
            let (dithered, planes) =
                epd_link::convert(&source, options.mode, options.policy(), options.panel)?;
            if let Some(path) = &options.save {
                imaging::save(&dithered, Path::new(path))?;
            }
            println!(
                "[2/3] Encoded {}x{}: {} + {} bytes",
                planes.width,
                planes.height,
                planes.primary.len(),
                planes.secondary.len()
            );
            if let Some(path) = &options.preview {
                imaging::save(&planes.preview()?, Path::new(path))?;
            }
            let config = session_config(options.positional.get(1))?;
            print!("[3/3] ");
            upload(
                config,
                planes.primary.as_bytes(),
                planes.secondary.as_bytes(),
            )
        }
        "dither" => {
            let input = options.positional.get(0).ok_or_else(|| missing("input"))?;
            let output = options.positional.get(1).ok_or_else(|| missing("output"))?;
            let source = imaging::load(Path::new(input), options.panel)?;
            let dithered = epd_link::quantize(&source, &options.mode.palette(), options.policy())?;
            imaging::save(&dithered, Path::new(output))?;
            println!("Successfully processed image and saved to {}", output);
            Ok(())
        }
        "test-pattern" => {
            let (primary, secondary) = epd_link::test_pattern();
            upload(session_config(options.positional.get(0))?, &primary, &secondary)
        }
        other => Err(Error::InvalidArgument(format!("unknown command '{}'", other))),
    }
}

fn missing(what: &str) -> Error {
    Error::InvalidArgument(format!("missing <{}> argument", what))
}

fn main() {
    dotenvy::dotenv().ok();

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{}:{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();

    let args: Vec<String> = env::args().collect();
    let command = match args.get(1).map(String::as_str) {
        None | Some("--help") | Some("-h") => {
            print_usage();
            return;
        }
        Some(command) => command,
    };

    let options = match Options::parse(&args[2..]) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Error: {}", err);
            print_usage();
            process::exit(2);
        }
    };

    if let Err(err) = run(command, options) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

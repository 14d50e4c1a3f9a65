use std::path::PathBuf;

use podqa::RunOptions;

const USAGE: &str = "podqa - Ask questions about podcast episodes from the terminal.

  --version, -V          Show version and exit
  --help,    -h          Show this help message
  --config <path>        Read configuration from <path>
  --base-url <url>       Question service base URL
  --podcast <id>         Podcast whose episodes are listed
  --mode <mode>          Initial answer mode (rag, fulltext)";

enum Cli {
    Run(RunOptions),
    Exit,
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Run(options)) => options,
        Ok(Cli::Exit) => return,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(err) = podqa::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut options = RunOptions::default();
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("podqa {}", podqa::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(Cli::Exit);
            }
            "--config" => options.config_file = Some(PathBuf::from(value(&arg, args.next())?)),
            "--base-url" => options.base_url = Some(value(&arg, args.next())?),
            "--podcast" => options.podcast_id = Some(value(&arg, args.next())?),
            "--mode" => options.mode = Some(value(&arg, args.next())?),
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Ok(Cli::Run(options))
}

fn value(flag: &str, next: Option<String>) -> Result<String, String> {
    match next {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(format!("{flag} needs a value")),
    }
}

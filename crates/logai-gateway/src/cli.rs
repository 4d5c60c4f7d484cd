use std::path::PathBuf;

use anyhow::{Result, anyhow};

pub const USAGE: &str = "Usage: logai-gateway [--config <file>] [--host <addr>] [--port <port>] [--db <file>]";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<PathBuf>,
    pub help: bool,
}

/// Parse flags after the program name.
pub fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let next = args.get(i + 1).cloned();
        let value = || next.clone().ok_or_else(|| anyhow!("{} needs a value\n{}", flag, USAGE));
        match flag {
            "--config" | "-c" => {
                out.config = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--host" => {
                out.host = Some(value()?);
                i += 2;
            }
            "--port" | "-p" => {
                let raw = value()?;
                out.port = Some(
                    raw.parse()
                        .map_err(|_| anyhow!("--port expects a number, got '{}'", raw))?,
                );
                i += 2;
            }
            "--db" => {
                out.db = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--help" | "-h" => {
                out.help = true;
                i += 1;
            }
            other => return Err(anyhow!("unknown argument '{}'\n{}", other, USAGE)),
        }
    }
    Ok(out)
}

//! The fortune-client executable supports the following command line arguments:
//!
//! `fortune-client <ADDR:PORT>`
//!
//!     Read a random fortune from the server and print it.
//!
//! `fortune-client -w <FORTUNE> <ADDR:PORT>`
//!
//!     Write a new fortune to the server.
//!
//! `fortune-client -i <ADDR:PORT>`
//!
//!     Start an interactive session with the fortune database.
//!
//! An error reported by the server is printed and the client exits with a non-zero code.

use std::io::{self, BufRead, Write};
use std::process::exit;

use clap::{crate_version, App, Arg};
use fortune::{FortuneClient, FortuneError, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const MENU: &str = "\
Choose one of the following commands:
    r            ::  read a random fortune from the database,
    w <FORTUNE>  ::  write a new fortune into the database,
    h            ::  print this menu,
    q            ::  exit.";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    client: FortuneClient,
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    Read,
    Write(String),
    Interactive,
}

impl Opt {
    /// validates that `addr` has the form HOST:PORT and resolves it
    /// # Errors
    /// returns [`FortuneError::StringErr`] if `addr` is not a correct server address
    fn build(addr: &str, mode: Mode) -> Result<Opt> {
        let valid = match addr.rsplit_once(':') {
            Some((host, port)) => {
                !host.is_empty() && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
            }
            None => false,
        };
        if !valid {
            return Err(FortuneError::StringErr(format!(
                "{} is not a correct server address.",
                addr
            )));
        }
        Ok(Opt {
            client: FortuneClient::new(addr)?,
            mode,
        })
    }
}

fn main() {
    let matches = App::new("fortune-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("Client for a fortune database. It reads a random fortune from the database.")
        .arg(Arg::with_name("write")
            .short("w")
            .long("write")
            .value_name("FORTUNE")
            .help("Write a new fortune to the database."))
        .arg(Arg::with_name("interactive")
            .short("i")
            .long("interactive")
            .conflicts_with("write")
            .help("Interactive session with the fortune database."))
        .arg(Arg::with_name("verbose")
            .short("v")
            .long("verbose")
            .help("log debug output"))
        .arg(Arg::with_name("ADDR")
            .value_name("addr:port")
            .help("Server address.")
            .required(true)
            .index(1))
        .get_matches();

    subscriber_config(matches.is_present("verbose"));

    let mode = if matches.is_present("interactive") {
        Mode::Interactive
    } else if let Some(fortune) = matches.value_of("write") {
        Mode::Write(fortune.to_owned())
    } else {
        Mode::Read
    };

    let result = Opt::build(matches.value_of("ADDR").unwrap_or_default(), mode).and_then(run);
    if let Err(e) = result {
        report(&e);
        exit(1);
    }
}

/// runs the requested `mode` against the server
fn run(opt: Opt) -> Result<()> {
    match opt.mode {
        Mode::Read => println!("{}", opt.client.read()?),
        Mode::Write(fortune) => opt.client.write(fortune)?,
        Mode::Interactive => interactive(&opt.client)?,
    }
    Ok(())
}

/// the interactive menu, server errors are reported and the session goes on
fn interactive(client: &FortuneClient) -> Result<()> {
    println!("{}", MENU);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("Command> ");
        io::stdout().flush()?;
        let command = match lines.next() {
            Some(line) => line?,
            None => return Ok(()),
        };

        let result = match command.as_str() {
            "q" => return Ok(()),
            "h" => {
                println!("{}", MENU);
                Ok(())
            }
            "r" => client.read().map(|fortune| println!("{}", fortune)),
            cmd if cmd.len() > 1 && cmd.starts_with('w') && cmd[1..].starts_with(&[' ', '\t'][..]) => {
                client.write(cmd[2..].trim())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            report(&e);
        }
    }
}

/// prints `e` the way the server reported it
fn report(e: &FortuneError) {
    match e {
        FortuneError::Remote { name, message } => {
            eprintln!("An error has occurred on the server:");
            eprintln!("{}:\n\t{}", name, message);
        }
        other => eprintln!("{}", other),
    }
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}

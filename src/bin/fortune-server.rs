//! this binary starts the fortune server
//! to see the list of options, type: `fortune-server --help`

use std::fs;
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use clap::{arg_enum, crate_version, value_t, App, Arg, ArgMatches};
use fortune::{
    FortuneError, FortuneServer, NaiveThreadPool, RayonThreadPool, RecordStore, Result,
    SharedQueueThreadPool, StoreOptions, ThreadPool,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        naive,
        shared,
        rayon
    }
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_FILE: &str = "dbs/fortune.db";
const DEFAULT_ADDR_FILE: &str = "srv_address.tmp";
const DEFAULT_THREADS: &str = "8";
// ports the server may listen on, a random one is picked when --port is not given
const PORT_RANGE: RangeInclusive<u16> = 40001..=49999;

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    host: String,
    port: u16,
    file: PathBuf,
    addr_file: PathBuf,
    pool: Pool,
    threads: u32,
    store: StoreOptions,
}

impl Opt {
    /// validates the command line `matches`
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`FortuneError::StringErr`] if one of the parameters is invalid
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let port = match matches.value_of("port") {
            Some(port) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| FortuneError::StringErr(format!("{} is not a valid port", port)))?;
                if !PORT_RANGE.contains(&port) {
                    return Err(FortuneError::StringErr(format!(
                        "port {} is outside of {}..={}",
                        port,
                        PORT_RANGE.start(),
                        PORT_RANGE.end()
                    )));
                }
                port
            }
            None => StdRng::from_entropy().gen_range(PORT_RANGE),
        };

        let threads = value_t!(matches, "threads", u32)
            .map_err(|e| FortuneError::StringErr(e.message))?;
        let seed = parse_optional::<u64>(matches, "seed")?;
        let lock_timeout = parse_optional::<u64>(matches, "lock-timeout-ms")?.map(Duration::from_millis);
        let pool = value_t!(matches, "pool", Pool).map_err(|e| FortuneError::StringErr(e.message))?;

        Ok(Opt {
            host: matches.value_of("host").unwrap_or(DEFAULT_HOST).to_owned(),
            port,
            file: PathBuf::from(matches.value_of("file").unwrap_or(DEFAULT_FILE)),
            addr_file: PathBuf::from(matches.value_of("addr-file").unwrap_or(DEFAULT_ADDR_FILE)),
            pool,
            threads,
            store: StoreOptions { seed, lock_timeout },
        })
    }
}

fn main() {
    // parse command line args
    let matches = App::new("fortune-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("Server for a fortune database. It allows clients to access the database in parallel.")
        .arg(Arg::with_name("port")
            .short("p")
            .long("port")
            .value_name("PORT")
            .help("sets the port to listen on, in [40001, 49999]. A random port is chosen by default"))
        .arg(Arg::with_name("host")
            .long("host")
            .value_name("IP_ADDR")
            .help("sets the IP address to listen on")
            .default_value(DEFAULT_HOST))
        .arg(Arg::with_name("file")
            .short("f")
            .long("file")
            .value_name("FILE")
            .help("sets the database file")
            .default_value(DEFAULT_FILE))
        .arg(Arg::with_name("addr-file")
            .long("addr-file")
            .value_name("FILE")
            .help("file the server writes its HOST:PORT into once it listens")
            .default_value(DEFAULT_ADDR_FILE))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .help("how connections are run: a thread each (naive) or on a fixed number of threads (shared, rayon)")
            .possible_values(&Pool::variants())
            .default_value("naive"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .value_name("N")
            .help("number of worker threads of the shared and rayon pools")
            .default_value(DEFAULT_THREADS))
        .arg(Arg::with_name("seed")
            .long("seed")
            .value_name("N")
            .help("seed for picking random fortunes"))
        .arg(Arg::with_name("lock-timeout-ms")
            .long("lock-timeout-ms")
            .value_name("MILLIS")
            .help("give up on a request after waiting this long for the database lock"))
        .arg(Arg::with_name("verbose")
            .short("v")
            .long("verbose")
            .help("log debug output"))
        .get_matches();

    // set up a tracing subscriber to log to STDERR
    subscriber_config(matches.is_present("verbose"));

    // validate command line options, store them in Opt
    let opt = match Opt::build(&matches) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("fortune-server {}", env!("CARGO_PKG_VERSION"));
    let store = RecordStore::open_with(&opt.file, opt.store.clone())?;

    let listener = TcpListener::bind((opt.host.as_str(), opt.port))?;
    let local = listener.local_addr()?;
    let advertised = if local.ip().is_unspecified() {
        String::from("localhost")
    } else {
        local.ip().to_string()
    };
    info!("Listening to: {}:{}", advertised, local.port());
    fs::write(&opt.addr_file, format!("{}:{}\n", advertised, local.port()))?;
    info!("Press Ctrl-C to stop the server...");

    match opt.pool {
        Pool::naive => run_with_pool(store, NaiveThreadPool::new(opt.threads)?, listener),
        Pool::shared => run_with_pool(store, SharedQueueThreadPool::new(opt.threads)?, listener),
        Pool::rayon => run_with_pool(store, RayonThreadPool::new(opt.threads)?, listener),
    }
}

fn run_with_pool<P: ThreadPool>(store: RecordStore, pool: P, listener: TcpListener) -> Result<()> {
    let server = FortuneServer::new(store, pool);
    server.serve(listener)
}

/// parses the optional argument `name`, `Ok(None)` if it was not given
fn parse_optional<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    matches
        .value_of(name)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| FortuneError::StringErr(format!("invalid value for --{}: {}", name, v)))
        })
        .transpose()
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        // all spans/events at `level` or above will be written out
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}

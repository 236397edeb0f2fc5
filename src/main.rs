use {
    cec_control::{
        backend::linux::LinuxBackend,
        controller::KeySink,
        daemon,
        types::{CecDeviceType, CecUserControlKey},
        CancelToken,
    },
    clap::{Parser, Subcommand},
    log::{error, info, LevelFilter},
    std::process::ExitCode,
};

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    match args.command.unwrap_or_default().run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Register on the bus and forward TV remote keys [default]")]
    Serve {
        /// OSD name announced to the bus
        #[arg(long, default_value = "cec-control")]
        name: String,

        /// Role to register the adapter as
        #[arg(long, value_enum, default_value_t = CecDeviceType::Playback)]
        device_type: CecDeviceType,
    },

    #[command(about = "List CEC adapters and the devices behind them")]
    List,

    #[command(about = "Log bus traffic for a while")]
    Trace {
        #[arg(default_value_t = 30)]
        seconds: u64,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve {
            name: "cec-control".into(),
            device_type: CecDeviceType::Playback,
        }
    }
}

impl Command {
    fn run(self) -> Result<(), daemon::Error> {
        match self {
            Command::Serve { name, device_type } => {
                let backend = LinuxBackend::new(name);
                let token = cancel_on_signal();
                let mut sink = LogKeySink;
                daemon::serve(&backend, device_type, &token, &mut sink)
            }
            Command::List => {
                print!("{}", daemon::list(&LinuxBackend::new("cec-control")));
                Ok(())
            }
            Command::Trace { seconds } => {
                let backend = LinuxBackend::new("cec-control");
                let token = cancel_on_signal();
                daemon::trace(&backend, &token, seconds)
            }
        }
    }
}

/// Token wired to SIGINT/SIGTERM. The handler only flips the flag; loops
/// notice it at their next iteration and unwind normally.
fn cancel_on_signal() -> CancelToken {
    let token = CancelToken::default();
    token.on_cancel(|| info!("shutting down"));
    let signal_token = token.clone();
    if let Err(err) = ctrlc::set_handler(move || signal_token.cancel()) {
        error!("installing the signal handler failed: {err}");
    }
    token
}

/// Key injection into the host input layer is out of scope; decoded keys
/// are surfaced on the log where a consumer can pick them up.
struct LogKeySink;

impl KeySink for LogKeySink {
    fn emit_key(&mut self, key: CecUserControlKey) {
        info!("key: {key:?}");
    }
}

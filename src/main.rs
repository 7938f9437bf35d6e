use argh::FromArgs;
use pipesh::config::DEFAULT_HISTORY_CAPACITY;
use pipesh::{Interpreter, ShellConfig};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(FromArgs)]
/// An interactive shell with pipes, redirections and executable completion.
struct Args {
    /// number of lines kept in history
    #[argh(option, default = "DEFAULT_HISTORY_CAPACITY")]
    history_size: usize,

    /// text printed before each line is read
    #[argh(option)]
    prompt: Option<String>,

    /// log debug events to stderr
    #[argh(switch)]
    verbose: bool,

    /// log trace events to stderr
    #[argh(switch)]
    trace: bool,
}

fn init_tracing(args: &Args) {
    let level = if args.trace {
        LevelFilter::TRACE
    } else if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_filter(Targets::new().with_default(level));

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        eprintln!("warning: failed to initialize tracing.");
    }
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    init_tracing(&args);

    let mut config = ShellConfig {
        history_capacity: args.history_size,
        ..ShellConfig::default()
    };
    if let Some(prompt) = args.prompt {
        config.prompt = prompt;
    }

    let code = Interpreter::new(config).repl()?;
    std::process::exit(code)
}

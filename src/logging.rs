//! Logging setup — log4rs wired exactly the way the teacher's `logging.rs`
//! does: a pattern-encoded console appender plus a size-rolling file
//! appender, scoped to this crate's module path.

use crate::config::LoggingConfig;
use log::LevelFilter;
use log4rs::{
    append::{
        console::ConsoleAppender,
        rolling_file::{
            policy::compound::{
                roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    init_config, Config,
};

const LOGGING_PATTERN: &str = "[{d} {h({l})} {M}] {m}{n}";
/// Max logging file size before rolling over to the next log file (5mb).
const LOGGING_MAX_SIZE: u64 = 1024 * 1024 * 5;
const LOGGING_MAX_FILES: u32 = 8;
const LOGGING_MODULES: [&str; 1] = ["spotit_relay"];

/// Configures log4rs for console + rolling-file output, scoped to this
/// crate's modules, and falling back to a `Warn` root logger for
/// dependency noise.
pub fn setup(config: &LoggingConfig) {
    let pattern = Box::new(PatternEncoder::new(LOGGING_PATTERN));
    let size_trigger = SizeTrigger::new(LOGGING_MAX_SIZE);

    let mut file_pattern = format!("{}/log-{{}}.log", config.dir);
    if config.compression {
        file_pattern.push_str(".gz");
    }
    let latest_path = format!("{}/log.log", config.dir);

    let fixed_window_roller = FixedWindowRoller::builder()
        .build(&file_pattern, LOGGING_MAX_FILES)
        .expect("unable to create fixed window log roller");

    let compound_policy =
        CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));

    let stdout_appender = ConsoleAppender::builder().encoder(pattern.clone()).build();

    let file_appender = RollingFileAppender::builder()
        .encoder(pattern)
        .build(&latest_path, Box::new(compound_policy))
        .expect("unable to create logging file appender");

    const APPENDERS: [&str; 2] = ["stdout", "file"];

    let mut builder = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout_appender)))
        .appender(Appender::builder().build("file", Box::new(file_appender)));

    for module in LOGGING_MODULES {
        builder = builder.logger(
            Logger::builder()
                .appenders(APPENDERS)
                .additive(false)
                .build(module, config.level),
        )
    }

    let root_config = builder
        .build(
            Root::builder()
                .appenders(APPENDERS)
                .build(LevelFilter::Warn),
        )
        .expect("failed to create logging config");

    init_config(root_config).expect("unable to initialize logger");
}

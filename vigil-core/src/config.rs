//! daemon runtime configs

pub mod cli {
    //! Parse from either cli or env var

    /// Default REST/WebSocket api listen addr
    pub static DEFAULT_API_ADDR: &str = "[::]:8000";
    /// the default path to config
    pub static DEFAULT_CONFIG_PATH: &str = "/var/lib/vigil/config.yaml";
    /// tokio worker thread name
    pub static DEFAULT_THREAD_NAME: &str = "vigil-api-worker";
    /// default log level. Can use this argument or VIGIL_LOG env var
    pub const DEFAULT_VIGIL_LOG: &str = "info";

    use std::{net::SocketAddr, path::PathBuf};

    pub use clap::Parser;

    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "vigil", bin_name = "vigil", about, long_about = None)]
    /// parses from cli & environment var
    pub struct Config {
        /// path to vigil's config
        #[clap(
            short,
            long,
            value_parser,
            env,
            default_value = DEFAULT_CONFIG_PATH
        )]
        pub config_path: PathBuf,
        /// the address the REST/WebSocket api listens on
        #[clap(long, env, value_parser, default_value = DEFAULT_API_ADDR)]
        pub api_addr: SocketAddr,
        /// capture interface; overrides the `interface` key in the config file
        #[clap(short, long, env, value_parser)]
        pub interface: Option<String>,
        /// Worker thread name
        #[clap(long, env, value_parser, default_value = DEFAULT_THREAD_NAME)]
        pub thread_name: String,
        /// set the log level. All valid RUST_LOG arguments are accepted
        #[clap(long, env, value_parser, default_value = DEFAULT_VIGIL_LOG)]
        pub vigil_log: String,
    }
}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    use std::str;

    use crate::env::var_or;

    /// log as "json" or "standard" (unstructured)
    static DEFAULT_LOG_FORMAT: &str = "standard";

    /// Log output configuration
    #[derive(Debug)]
    pub struct Config {
        /// formatting to apply to logs
        pub log_frmt: String,
    }

    impl Config {
        /// Install the global subscriber. Log level comes from `vigil_log`,
        /// output shape from the LOG_FORMAT env var.
        pub fn parse(vigil_log: &str) -> Result<Self> {
            let log_frmt: String = var_or("LOG_FORMAT", DEFAULT_LOG_FORMAT)?;

            let filter = EnvFilter::try_new(vigil_log)
                .or_else(|_| EnvFilter::try_new("info"))?
                .add_directive("hyper=off".parse()?);

            match &log_frmt[..] {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new()),
                        )
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer())
                        .init();
                }
            }

            Ok(Self { log_frmt })
        }
    }
}

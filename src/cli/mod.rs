use clap::Subcommand;

pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the chat page over HTTP
    Serve {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Bind to 0.0.0.0 instead of 127.0.0.1, exposing the server on all network interfaces
        #[arg(long)]
        public: bool,

        /// Forget sessions that have been idle for this many seconds
        #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS)]
        session_ttl_secs: u64,
    },

    /// Ask a single question and print the reply
    Ask { question: String },
}

use clap::{Parser, Subcommand};

/// activity-digest: multi-account design activity digests
#[derive(Parser)]
#[command(name = "activity-digest", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the trigger server
    Serve {
        /// Port to bind (defaults to DIGEST_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one digest pass and print the report
    Run,

    /// Validate every credential and post expiry warnings
    CheckExpiry,

    /// Manage stored account credentials
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Store (or overwrite) an account's secret
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        account: String,
        /// Provider secret; read from DIGEST_ACCOUNT_SECRET when omitted
        #[arg(long, env = "DIGEST_ACCOUNT_SECRET", hide_env_values = true)]
        secret: String,
        /// Team ids the account may walk
        #[arg(long, value_delimiter = ',')]
        teams: Vec<String>,
        /// Known expiry, RFC 3339
        #[arg(long)]
        expires_at: Option<String>,
    },
    /// List stored credentials (metadata only)
    List {
        #[arg(long)]
        user: Option<String>,
    },
    /// Remove an account and its cursor
    Delete {
        #[arg(long)]
        user: String,
        #[arg(long)]
        account: String,
    },
    /// Replace an account's secret, keeping its history
    Rotate {
        #[arg(long)]
        user: String,
        #[arg(long)]
        account: String,
        #[arg(long, env = "DIGEST_ACCOUNT_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(long)]
        expires_at: Option<String>,
    },
}

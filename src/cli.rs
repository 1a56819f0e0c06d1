use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "speechcoach")]
#[command(about = "Speech coaching client: sign in, analyze recordings and manage credits")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Keep tokens in memory for this run instead of the OS keychain
    #[arg(long)]
    pub ephemeral: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with an Apple identity token
    SignIn {
        /// Identity token returned by Apple
        identity_token: String,

        /// Apple user identifier
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        given_name: Option<String>,

        #[arg(long)]
        family_name: Option<String>,
    },

    /// Show the signed-in profile
    Me,

    SignOut,

    /// Delete the speech profile and sign out
    DeleteAccount,

    /// Upload a recording for analysis
    Analyze {
        /// Audio file (a file:// URI is accepted)
        file: String,

        /// Duration in seconds
        #[arg(short, long)]
        duration: f64,

        #[arg(long, default_value = "audio/m4a")]
        mime: String,
    },

    /// List, show or delete recordings
    Recordings {
        #[command(subcommand)]
        action: Option<RecordingAction>,
    },

    /// Show the current credit balance
    Balance,

    /// List speech transactions
    Transactions,

    /// Create a payment intent for a top-up
    PaymentIntent { amount: Decimal },

    /// Create payment sheet parameters for a top-up
    PaymentSheet { amount: Decimal },
}

#[derive(Subcommand)]
pub enum RecordingAction {
    List,
    Show { id: i64 },
    Delete { id: i64 },
}

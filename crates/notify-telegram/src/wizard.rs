//! The `/setup` conversation: server, then user, then password.
//!
//! The step logic here is pure; handlers persist the returned state and
//! talk to Telegram.

use url::Url;

use notify_models::{SetupState, SetupStep};

/// Callback data of the inline cancel button.
pub const CANCEL_CALLBACK: &str = "setup:cancel";

pub const PROMPT_SERVER: &str = "Send the Rocket.Chat server address, e.g. chat.example.com";
pub const PROMPT_USER: &str = "Now send your username.";
pub const PROMPT_PASSWORD: &str =
    "Now send your password. The message is deleted right after it is read.";

/// Result of feeding one message into the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStep {
    /// Store the new state and show the prompt.
    Next {
        state: SetupState,
        prompt: &'static str,
    },
    /// Input was not accepted; the state is unchanged.
    Rejected(String),
    /// All fields collected.
    Complete {
        server: String,
        user: String,
        password: String,
    },
    /// Stored state is inconsistent; the wizard must start over.
    Restart,
}

/// Normalizes a server address. Adds `https://` when no scheme is given
/// and drops trailing slashes.
pub fn normalize_server(input: &str) -> Result<String, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("The server address cannot be empty.".to_string());
    }

    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let url = Url::parse(&candidate).map_err(|e| format!("That is not a valid address: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("Only http and https addresses are supported.".to_string());
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("The address has no host name.".to_string());
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

/// Applies one message to the wizard.
pub fn advance(state: &SetupState, input: &str) -> WizardStep {
    match state.step {
        SetupStep::Server => match normalize_server(input) {
            Ok(server) => WizardStep::Next {
                state: state.clone().with_server(server),
                prompt: PROMPT_USER,
            },
            Err(reason) => WizardStep::Rejected(reason),
        },
        SetupStep::User => {
            let user = input.trim();
            if user.is_empty() {
                return WizardStep::Rejected("The username cannot be empty.".to_string());
            }
            WizardStep::Next {
                state: state.clone().with_user(user),
                prompt: PROMPT_PASSWORD,
            }
        }
        SetupStep::Pass => {
            if input.trim().is_empty() {
                return WizardStep::Rejected("The password cannot be empty.".to_string());
            }
            match (&state.server, &state.user) {
                (Some(server), Some(user)) => WizardStep::Complete {
                    server: server.clone(),
                    user: user.clone(),
                    password: input.to_string(),
                },
                _ => WizardStep::Restart,
            }
        }
    }
}

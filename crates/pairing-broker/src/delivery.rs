//! Rendering of the credential delivery messages.

use crate::config::DeliveryConfig;
use crate::phone::PhoneNumber;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretVec};

/// Who the delivery is addressed to.
#[derive(Debug, Clone)]
pub struct DeliveryContext<'a> {
    /// The session's own identity, as reported when the connection opened
    pub destination: &'a str,
    pub phone_number: &'a PhoneNumber,
}

/// The two messages sent to the destination, in order.
pub struct DeliveryPayload {
    /// Prefix followed by the base64 credential
    pub marker: String,
    /// Human-readable setup instructions
    pub instructions: String,
}

/// Stateless formatter for delivery messages.
#[derive(Debug, Clone)]
pub struct DeliveryFormatter {
    config: DeliveryConfig,
}

impl DeliveryFormatter {
    pub fn new(config: DeliveryConfig) -> Self {
        Self { config }
    }

    pub fn render(&self, credential: &SecretVec<u8>, ctx: &DeliveryContext<'_>) -> DeliveryPayload {
        let marker = format!(
            "{}{}",
            self.config.marker_prefix,
            STANDARD.encode(credential.expose_secret())
        );

        DeliveryPayload {
            marker,
            instructions: self.instructions(ctx),
        }
    }

    fn instructions(&self, ctx: &DeliveryContext<'_>) -> String {
        let mut text = format!(
            "*SESSION CONNECTED*\n\
             Bot: {}\n\
             Account: {}\n\
             Linked to: {}\n\
             \n\
             *SETUP INSTRUCTIONS*\n\
             1. Copy the session ID above\n\
             2. Go to your deployment platform\n\
             3. Set environment variable:\n   SESSION_ID = <paste session>\n\
             4. Deploy your bot\n",
            self.config.bot_name,
            ctx.phone_number.masked(),
            ctx.destination,
        );

        let links: Vec<String> = [
            ("Owner", &self.config.owner_contact),
            ("Repo", &self.config.repository_url),
            ("Channel", &self.config.channel_url),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();

        if !links.is_empty() {
            text.push_str("\n*SUPPORT & LINKS*\n");
            for link in links {
                text.push_str(&link);
                text.push('\n');
            }
        }

        text.push_str("\nKeep your session ID private!\n");
        text
    }
}

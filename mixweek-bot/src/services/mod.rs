//! REST clients for the external services the bot depends on

pub mod discord;
pub mod spotify;

pub use discord::DiscordClient;
pub use spotify::SpotifyClient;

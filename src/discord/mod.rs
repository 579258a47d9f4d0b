#[cfg(feature = "discord")]
mod presence;

#[cfg(feature = "discord")]
pub use presence::DiscordPresence;

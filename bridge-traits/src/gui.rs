//! GUI surface abstraction.
//!
//! The core never renders anything. It shows and removes named pages and
//! writes playback details into the GUI's session data; the host GUI media
//! players read that map and drive their own audio/video elements.

use crate::error::Result;
use serde_json::Value;

/// Session data key read by the GUI players to follow the playback state.
pub const SESSION_KEY_STATUS: &str = "status";

/// GUI surface trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::gui::GuiSurface;
///
/// async fn show_video(gui: &dyn GuiSurface, uri: &str) -> bridge_traits::error::Result<()> {
///     gui.set_session_data("uri", serde_json::json!(uri));
///     gui.show_page("video_player").await
/// }
/// ```
#[async_trait::async_trait]
pub trait GuiSurface: Send + Sync {
    /// Show a named page, bringing it to the foreground.
    async fn show_page(&self, page: &str) -> Result<()>;

    /// Remove previously shown pages.
    async fn remove_pages(&self, pages: &[String]) -> Result<()>;

    /// Write a value into the GUI session data map.
    fn set_session_data(&self, key: &str, value: Value);

    /// Read a value from the GUI session data map.
    fn session_data(&self, key: &str) -> Option<Value>;
}

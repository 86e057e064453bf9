pub mod attendance;
pub mod catalog;
pub mod fees;
pub mod payments;

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

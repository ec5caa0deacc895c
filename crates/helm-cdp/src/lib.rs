//! Chrome DevTools Protocol transport and a page-indexing browser driver.
//!
//! [`browser::Browser`] owns one WebSocket connection to a Chrome
//! instance and hands out [`browser::Tab`] handles per target. Element
//! addressing goes through the small integer indices produced by
//! [`js::elements_js`], which are stable for one turn of agent activity
//! but invalidated by navigation.

pub mod browser;
pub mod client;
pub mod error;
pub mod js;
pub mod launcher;
pub mod transport;
pub mod types;

pub use browser::{Browser, Element, Tab};
pub use error::{BrowserError, CdpError};
pub use launcher::{ChromeDiscovery, DefaultChromeDiscovery};

//! Client for the utility-billing portal.
//!
//! The portal is an ASP.NET WebForms application: every interaction is a
//! full-page postback that must round-trip the hidden fields of the previous
//! page, and the session itself is tracked with a cookie.

pub mod cascade;
pub mod errors;
pub mod form;
pub mod models;
pub mod records;
pub mod session;

pub use cascade::{EntryPage, FloorsPage, RoomsPage};
pub use errors::PortalError;
pub use models::{OptionEntry, Selection, SelectionKind, SelectionValues, UsageRecord, UsageReport};
pub use records::DateRange;
pub use session::{Portal, PortalSession, PortalSettings, SessionState};

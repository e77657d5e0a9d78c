//! Effect-style cloud operations for release publishing
//!
//! Every side-effecting S3/CloudFront operation is represented as an inert
//! [`Intent`] value. Constructing an intent does nothing; handing it to a
//! [`Dispatcher`] executes it against whichever backend that dispatcher was
//! built for — the live AWS services ([`aws::dispatcher`]) or an in-memory
//! fake ([`fake::FakeCloud`]). The two recursive operations are composed
//! out of primitive intents and re-enter dispatch for each step, so the
//! same composite code runs against either backend.

pub mod aws;
pub mod composite;
pub mod dispatch;
pub mod error;
pub mod fake;
pub mod intent;

pub use dispatch::{Dispatcher, DispatcherBuilder, Performer};
pub use error::{Error, Result};
pub use intent::{Intent, IntentKind, Outcome};

//! Reference implementations of the engine's two external seams:
//! [`StaticAccount`] (an in-memory `Account`) and [`MockAdapter`] (a
//! scriptable `ProviderAdapter`), plus [`HttpAdapterBase`], a small helper
//! for building a real HTTP-backed adapter on top of `reqwest` that plugs
//! into the engine's retry/cancellation contract.
//!
//! None of this is required by `omnigate-core`; an embedding application is
//! free to supply its own `Account`/`ProviderAdapter` instead.

mod http_adapter;
mod mock_adapter;
mod static_account;

pub use http_adapter::{HttpAdapterBase, HttpAdapterError};
pub use mock_adapter::{MockAdapter, Scripted};
pub use static_account::StaticAccount;

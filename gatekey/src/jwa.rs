//! Algorithm implementations per the JSON Web Algorithms (JWA)
//! standard, [RFC7518][]
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

#[cfg(feature = "hmac")]
pub mod hmac;
#[cfg(feature = "rsa")]
pub mod rsa;

#[cfg(feature = "hmac")]
#[doc(inline)]
pub use hmac::Hmac;
#[cfg(feature = "rsa")]
#[doc(inline)]
pub use rsa::Rsa;

mod algorithm;
mod usage;

pub use algorithm::Algorithm;
pub use usage::Usage;

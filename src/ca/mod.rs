pub mod csr;

pub use csr::{generate_csr, load_csr, SigningRequest};

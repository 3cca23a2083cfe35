pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{collect_stream, md5_hex, seeded_bytes};

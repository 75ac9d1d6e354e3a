pub mod album_access;

pub use album_access::album_access_middleware;

pub mod client;
#[cfg(test)]
pub mod fake;
pub mod inspector;
pub mod resolver;
pub mod traversal;
pub mod tree;

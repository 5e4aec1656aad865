pub mod manifest;
pub mod publish;
pub mod render;
pub mod role_split;

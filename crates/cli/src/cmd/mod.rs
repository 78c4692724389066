mod ostree_up;
mod up;

pub use ostree_up::cmd_ostree_up;
pub use up::cmd_up;

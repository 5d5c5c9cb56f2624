pub mod evs;
pub mod util;

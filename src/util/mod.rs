pub mod fixed_buf;

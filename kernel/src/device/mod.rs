pub mod chardev;
pub mod pit;

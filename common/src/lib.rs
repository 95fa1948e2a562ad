#![no_std]

pub mod image;
pub mod layout;

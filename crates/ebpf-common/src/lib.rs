#![cfg_attr(not(any(feature = "user", test)), no_std)]

pub mod forwarding;

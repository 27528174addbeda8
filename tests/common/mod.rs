#![allow(dead_code)]

pub(crate) mod logging;

pub(crate) mod mock_vm;

pub(crate) mod validators;

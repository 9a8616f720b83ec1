mod common;
mod support;

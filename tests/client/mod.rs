//! Connection manager tests over an in-memory transport.

mod manager_tests;

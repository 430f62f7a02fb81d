//! End-to-end tests against a gateway on a real socket.

mod session_tests;

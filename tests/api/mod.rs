//! HTTP endpoint tests.

mod health_tests;

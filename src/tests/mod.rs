//! Orchestration tests against a scripted capture service.

mod support;

mod client_tests;

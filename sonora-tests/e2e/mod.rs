//! End-to-end tests against a listening server

mod streaming_workflow;

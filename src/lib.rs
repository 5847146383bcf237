//! Lambda Bootstrap Workspace - end-to-end tests for the custom runtime.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crates:
//!
//! - `lambda-bootstrap`: The custom AWS Lambda runtime driver
//! - `lambda-simulator`: Simulates the AWS Lambda Runtime API locally
//! - `lambda-bootstrap-example`: Example `bootstrap` handler binaries

//! Integration tests for tierflow.
//!
//! The scan and failure tests drive complete runs against the in-memory
//! namespace and need no external services.
//!
//! The S3 tests require LocalStack and are marked as `#[ignore]`.
//!
//! ## Running the LocalStack tests
//!
//! 1. Start LocalStack:
//!    ```bash
//!    docker run -d -p 4566:4566 localstack/localstack
//!    ```
//!
//! 2. Run the ignored tests:
//!    ```bash
//!    LOCALSTACK_ENDPOINT=http://localhost:4566 cargo test -p integration-tests -- --ignored
//!    ```

mod common;
mod failure_test;
mod s3_test;
mod scan_test;

//! End-to-end tests for the Thunder pipeline live under `tests/`.

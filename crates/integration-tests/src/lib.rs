//! End-to-end relay tests; see `tests/`

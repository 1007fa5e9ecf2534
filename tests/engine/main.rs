//! Integration tests for Layer 2: Engine
//!
//! Tests for network construction, node sharing, and knowledge base changes.

mod network;

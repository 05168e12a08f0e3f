// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Entry Point
//!
//! This test suite uses proptest to verify properties of the allocators and
//! the queue's event selection that must hold for all valid inputs.

mod property;

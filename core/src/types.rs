//! Shared primitive types used across the analytics core.

/// A stable, unique identifier for one scored conversation.
pub type ConversationId = String;

/// Seller identifier.
pub type SellerId = String;

/// Branch identifier.
pub type BranchId = String;

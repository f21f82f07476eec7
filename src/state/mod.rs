// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod head;
pub mod kernel;

pub use head::{HeadEntry, LogPointer};
pub use kernel::KnowledgeState;

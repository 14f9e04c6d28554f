// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Key addressing the event timestamp.
pub const TIMESTAMP_FIELD_KEY: &str = "@timestamp";

/// Key addressing the pipeline metadata namespace.
pub const METADATA_FIELD_KEY: &str = "@metadata";

/// Prefix of every key inside the metadata namespace.
pub const METADATA_KEY_PREFIX: &str = "@metadata.";

/// Field holding the list of tags appended by `add_tags`.
pub const TAGS_KEY: &str = "tags";

/// Field holding processing errors recorded by `add_error`.
pub const ERROR_FIELD_KEY: &str = "error";

/// Metadata key holding the document id set by `Event::set_id`.
pub const ID_METADATA_KEY: &str = "_id";

/// Default upper bound on the number of processors in one chain.
pub const DEFAULT_MAX_PROCESSORS: usize = 64;

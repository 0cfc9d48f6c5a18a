// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Graph command - visualize the task graph

use miette::Result;
use std::path::PathBuf;

use super::{load_pipeline, GraphFormat};
use crate::pipeline::DagBuilder;

/// Run the graph command
pub async fn run(file: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let pipeline = load_pipeline(&file)?;
    let dag = DagBuilder::build(&pipeline);

    let output = match format {
        GraphFormat::Text => dag.to_text(&pipeline)?,
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    println!("{}", output.trim_end());

    Ok(())
}

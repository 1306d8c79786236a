use std::io::{IsTerminal, Write};

use anyhow::Result;
use console::style;
use tabled::{
    Table, Tabled,
    settings::{Padding, Style, object::Columns},
};

use crate::cmd::SystemRunner;
use crate::config::{ImageDefinition, ImageRegistry};
use crate::context::{DEFAULT_ENGINE, Mode, RunOptions};
use crate::pipeline::Pipeline;

#[derive(Tabled)]
struct ImageRow {
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "PATH")]
    path: String,
    #[tabled(rename = "ENABLED")]
    enabled: String,
    #[tabled(rename = "ENGINE")]
    engine: String,
    #[tabled(rename = "SANDBOX")]
    sandbox: String,
    #[tabled(rename = "ASSEMBLE")]
    assemble: String,
}

fn check(flag: bool) -> String {
    if flag { "✓".to_string() } else { String::new() }
}

fn image_row(image: &ImageDefinition, registry: &ImageRegistry, use_style: bool) -> ImageRow {
    let full_name = image.fully_qualified_name();
    let engine = registry.engine_for(image);

    // Emphasize what a run will touch and engines other than the default.
    let emphasize = |text: &str, on: bool| {
        if use_style && on {
            style(text).bold().to_string()
        } else {
            text.to_string()
        }
    };

    ImageRow {
        image: emphasize(&full_name, image.enabled()),
        path: image.build_path().display().to_string(),
        enabled: check(image.enabled()),
        engine: emphasize(engine, engine != DEFAULT_ENGINE),
        sandbox: emphasize(image.sandbox_name(), image.enabled() && image.assemble()),
        assemble: check(image.assemble()),
    }
}

fn render(images: &[&ImageDefinition], registry: &ImageRegistry, use_style: bool) -> String {
    let rows: Vec<ImageRow> = images
        .iter()
        .map(|image| image_row(image, registry, use_style))
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .modify(Columns::new(0..6), Padding::new(1, 1, 0, 0));
    table.to_string()
}

fn title(mode: Mode) -> &'static str {
    match mode {
        Mode::ListAssemble => "Images to assemble",
        Mode::ListEnabled => "Images to create",
        _ => "All images",
    }
}

pub fn run(options: &RunOptions) -> Result<()> {
    let registry = super::load_registry(options)?;

    if options.mode == Mode::ListLayers {
        let runner = SystemRunner::new(options.verbose);
        let mut stdout = std::io::stdout().lock();
        return Pipeline::new(options, &registry, &runner).list_layers(&mut stdout);
    }

    let stdout = std::io::stdout();
    let use_style = stdout.is_terminal();
    write_images(options.mode, &registry, &mut stdout.lock(), use_style)
}

/// Title and table for the images `mode` selects.
fn write_images(
    mode: Mode,
    registry: &ImageRegistry,
    out: &mut impl Write,
    use_style: bool,
) -> Result<()> {
    let images: Vec<&ImageDefinition> = match mode {
        Mode::ListAssemble => registry.assemble_targets(),
        Mode::ListEnabled => registry.enabled(),
        _ => registry.images().iter().collect(),
    };

    if images.is_empty() {
        writeln!(out, "No images found")?;
        return Ok(());
    }

    writeln!(out, "{}", title(mode))?;
    writeln!(out, "{}", render(&images, registry, use_style))?;
    Ok(())
}

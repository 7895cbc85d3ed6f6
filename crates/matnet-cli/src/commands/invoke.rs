//! `matnet invoke` - bootstrap, run inference, write the five maps.

use std::path::Path;

use matnet_core::{MaterialMaps, MatnetConfig, MaterialNode};

use crate::exit_codes::codes;

pub fn run(config: &MatnetConfig, image_path: &Path, out_dir: &Path) -> u8 {
    let input = match image::open(image_path) {
        Ok(image) => image,
        Err(error) => {
            eprintln!("ERROR: cannot read {}: {error}", image_path.display());
            return codes::GENERIC_ERROR;
        }
    };

    let mut node = match MaterialNode::new(config.clone()) {
        Ok(node) => node,
        Err(error) => {
            eprintln!("ERROR: {error}");
            return codes::GENERIC_ERROR;
        }
    };

    let maps = match node.run(&input) {
        Ok(maps) => maps,
        Err(matnet_core::invoke::InvokeError::NotReady { reason }) => {
            eprintln!("ERROR: environment not ready: {reason}");
            if let Some(failure) = node.last_bootstrap().and_then(|r| r.failure.as_ref()) {
                eprintln!("Remedy: {}", failure.kind.remedy());
            }
            return codes::NOT_READY;
        }
        Err(error) => {
            eprintln!("ERROR: {error}");
            return codes::GENERIC_ERROR;
        }
    };

    match write_maps(&maps, out_dir) {
        Ok(()) => {
            println!("Material maps written to {}", out_dir.display());
            codes::SUCCESS
        }
        Err(error) => {
            eprintln!("ERROR: cannot write outputs: {error}");
            codes::GENERIC_ERROR
        }
    }
}

fn write_maps(maps: &MaterialMaps, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(out_dir)?;
    maps.input.save(out_dir.join("input.png"))?;
    maps.normals.save(out_dir.join("normals.png"))?;
    maps.diffuse.save(out_dir.join("diffuse.png"))?;
    maps.roughness.save(out_dir.join("roughness.png"))?;
    maps.specular.save(out_dir.join("specular.png"))?;
    Ok(())
}

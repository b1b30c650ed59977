//! Prints a short summary of a game asset.
//!
//! ```text
//! readout <file>
//! readout --ini conf.ini <path inside mounted content>
//! ```

use std::process::ExitCode;

use source::{
    kv3::is_kv3,
    prelude::*,
    resource::is_compiled_resource,
    studio::{goldsrc::GOLDSRC_MDL_VERSION, mdl::MDL_ID, vvd::VVD_ID},
    vpk::VPK_SIGNATURE,
};

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (name, data) = match args.as_slice() {
        [flag, ini, path] if flag == "--ini" => {
            let content = match ContentManager::load_ini(ini) {
                Ok(content) => content,
                Err(err) => {
                    log::error!("could not read {ini}: {err}");
                    return ExitCode::FAILURE;
                }
            };
            match content.find_file(path) {
                Some(data) => (path.clone(), data),
                None => {
                    log::error!("{path} not found in {} providers", content.len());
                    return ExitCode::FAILURE;
                }
            }
        }
        [path] => match std::fs::read(path) {
            Ok(data) => (path.clone(), data),
            Err(err) => {
                log::error!("could not read {path}: {err}");
                return ExitCode::FAILURE;
            }
        },
        _ => {
            eprintln!("usage: readout <file> | readout --ini <conf.ini> <path>");
            return ExitCode::FAILURE;
        }
    };

    match describe(&name, data) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{name}: {err}");
            ExitCode::FAILURE
        }
    }
}

fn describe(name: &str, data: Vec<u8>) -> Result<()> {
    let magic = data.get(..4).map(|m| [m[0], m[1], m[2], m[3]]).unwrap_or_default();
    let word = u32::from_le_bytes(magic);

    if &magic == b"VBSP" || word == 30 {
        return describe_bsp(BSPFile::from_bytes(data)?);
    }
    if word == VPK_SIGNATURE {
        return describe_vpk(VPKDirectory::from_bytes(name, data)?);
    }
    if magic == MDL_ID {
        let version = data.get(4..8).map_or(0, |v| i32::from_le_bytes([v[0], v[1], v[2], v[3]]));
        let mut reader = ByteReader::from_vec(data);
        return if version == GOLDSRC_MDL_VERSION {
            describe_goldsrc_mdl(&GoldSrcMDL::read(&mut reader)?)
        } else {
            describe_mdl(&MDL::read(&mut reader)?)
        };
    }
    if magic == VVD_ID {
        let vvd = VVD::read(&mut ByteReader::from_vec(data))?;
        println!(
            "vertex data: {} vertices, {} lods, {} fixups, checksum {}",
            vvd.vertices.len(),
            vvd.lod_count(),
            vvd.fixups.len(),
            vvd.checksum()
        );
        return Ok(());
    }
    if is_kv3(&data) {
        return describe_kv3(&KV3Document::parse(data)?);
    }
    if is_compiled_resource(&data) {
        return describe_resource(&CompiledResource::parse(data)?);
    }
    Err(Error::unsupported(format!("unrecognised magic {magic:02x?}")))
}

fn describe_bsp(bsp: BSPFile) -> Result<()> {
    let header = bsp.header();
    println!(
        "map: {:?} version {}, revision {}, {} lumps present",
        bsp.engine(),
        header.version,
        header.map_revision,
        header.lumps.iter().filter(|l| l.is_present()).count()
    );
    if bsp.engine() != BSPEngine::Source {
        return Ok(());
    }
    let faces = bsp.get_lump::<Vec<BSPFace>>()?;
    let models = bsp.get_lump::<Vec<BSPModel>>()?;
    println!("  {} faces, {} models", faces.len(), models.len());
    match bsp.get_lump::<BSPEntities>() {
        Ok(entities) => {
            println!("  {} entities", entities.entities.len());
            if let Some(world) = entities.by_class("worldspawn").next() {
                println!("  skybox: {}", world.get("skyname").unwrap_or("none"));
            }
        }
        Err(err) => log::warn!("entities: {err}"),
    }
    match bsp.get_lump::<PakLump>() {
        Ok(pak) => println!("  pakfile: {} files", pak.len()),
        Err(err) => log::warn!("pakfile: {err}"),
    }
    Ok(())
}

fn describe_vpk(vpk: VPKDirectory) -> Result<()> {
    println!(
        "package: version {}, {} files, highest archive {:?}",
        vpk.header().version,
        vpk.len(),
        vpk.max_pack_file()
    );
    for (path, file) in vpk.entries().take(10) {
        println!("  {path} ({} bytes)", file.size());
    }
    Ok(())
}

fn describe_mdl(mdl: &MDL) -> Result<()> {
    println!("model {:?}: version {}, checksum {}", mdl.name, mdl.version(), mdl.checksum());
    println!(
        "  {} bones, {} body parts, {} materials, {} skins",
        mdl.skeleton.bones.len(),
        mdl.body_parts.len(),
        mdl.textures.len(),
        mdl.skin_families.len()
    );
    for rule in &mdl.flex_rules {
        println!("  {} = {}", mdl.flex_rule_name(rule), rule.expr);
    }
    Ok(())
}

fn describe_goldsrc_mdl(mdl: &GoldSrcMDL) -> Result<()> {
    println!(
        "goldsrc model {:?}: {} bones, {} body parts, {} textures",
        mdl.name,
        mdl.skeleton.bones.len(),
        mdl.body_parts.len(),
        mdl.textures.len()
    );
    Ok(())
}

fn describe_kv3(doc: &KV3Document) -> Result<()> {
    let keys = doc.keys(doc.root()).collect::<Vec<_>>();
    println!("kv3: {} strings, root keys {keys:?}", doc.strings().len());
    Ok(())
}

fn describe_resource(resource: &CompiledResource) -> Result<()> {
    println!("resource: version {}, {} blocks", resource.version, resource.blocks.len());
    for block in &resource.blocks {
        println!("  {} ({} bytes)", block.tag_str(), block.size);
    }
    if resource.get_block("DATA").is_some() && resource.get_block("REDI").is_some() {
        if let Ok(texture) = resource.texture() {
            println!(
                "  texture {}x{}x{} {:?}, {} mips",
                texture.width, texture.height, texture.depth, texture.format, texture.mip_count
            );
        }
    }
    Ok(())
}

use flagset::{flags, FlagSet};
use glam::{Vec3, Vec4};

use common::prelude::*;

use super::{
    consts::{GoldSrcLumpType, LumpType},
    header::BSPEngine,
    BSPFile, LumpData,
};

flags! {
    /// Typed views an entity class exposes over its raw key/values.
    pub enum EntityCapability: u8 {
        Origin,
        Angles,
        Targetname,
        Parentname,
        StudioModel,
        Light,
    }
}

use EntityCapability::*;

// Classes with no entry expose none of the capabilities.
const CLASS_CAPABILITIES: &[(&str, &[EntityCapability])] = &[
    ("ambient_generic", &[Targetname]),
    ("cycler", &[Angles, Parentname, Targetname]),
    ("env_beam", &[Parentname, Targetname]),
    ("env_cubemap", &[Origin]),
    ("env_fire", &[Parentname, Targetname]),
    ("env_fog_controller", &[Angles, Targetname]),
    ("env_lightglow", &[Angles, Parentname, Targetname]),
    ("env_projectedtexture", &[Angles, Parentname, Targetname]),
    ("env_smokestack", &[Angles, Parentname]),
    ("env_soundscape", &[Parentname, Targetname]),
    ("env_spark", &[Angles, Parentname, Targetname]),
    ("env_sprite", &[Parentname, Targetname]),
    ("env_steam", &[Angles, Parentname, Targetname]),
    ("env_sun", &[Angles, Targetname]),
    ("env_wind", &[Angles, Targetname]),
    ("func_areaportal", &[Targetname]),
    ("func_breakable", &[Origin, Parentname, Targetname]),
    ("func_brush", &[Origin, Parentname, Targetname]),
    ("func_button", &[Origin, Parentname, Targetname]),
    ("func_door", &[Origin, Parentname, Targetname]),
    ("func_door_rotating", &[Angles, Origin, Parentname, Targetname]),
    ("func_illusionary", &[Origin, Parentname, Targetname]),
    ("func_instance", &[Angles]),
    ("func_movelinear", &[Origin, Parentname, Targetname]),
    ("func_physbox", &[Origin, Parentname, Targetname]),
    ("func_rotating", &[Angles, Origin, Parentname, Targetname]),
    ("func_tracktrain", &[Origin, Parentname, Targetname]),
    ("func_wall", &[Targetname]),
    ("func_water_analog", &[Origin, Parentname, Targetname]),
    ("infodecal", &[Targetname]),
    ("info_landmark", &[Targetname]),
    ("info_null", &[Targetname]),
    ("info_overlay", &[Targetname]),
    ("info_particle_system", &[Angles, Parentname, Targetname]),
    ("info_player_start", &[Angles]),
    ("info_target", &[Angles, Parentname, Targetname]),
    ("info_teleport_destination", &[Angles, Parentname, Targetname]),
    ("keyframe_rope", &[Parentname, Targetname]),
    ("light", &[Light, Targetname]),
    ("light_dynamic", &[Angles, Parentname, Targetname]),
    ("light_environment", &[Angles]),
    ("light_spot", &[Angles, Light, Targetname]),
    ("logic_auto", &[]),
    ("logic_relay", &[Targetname]),
    ("logic_timer", &[Targetname]),
    ("move_rope", &[Parentname, Targetname]),
    ("npc_puppet", &[Angles, Parentname, StudioModel, Targetname]),
    ("path_track", &[Angles, Parentname, Targetname]),
    ("phys_magnet", &[Angles, Parentname, StudioModel, Targetname]),
    ("point_spotlight", &[Angles, Parentname, Targetname]),
    ("point_viewcontrol", &[Angles, Parentname, Targetname]),
    ("prop_door_rotating", &[Angles, Parentname, StudioModel, Targetname]),
    ("prop_dynamic", &[Angles, Parentname, StudioModel, Targetname]),
    ("prop_dynamic_ornament", &[Angles, Parentname, StudioModel, Targetname]),
    ("prop_dynamic_override", &[Angles, Parentname, StudioModel, Targetname]),
    ("prop_physics", &[Angles, StudioModel, Targetname]),
    ("prop_physics_multiplayer", &[Angles, StudioModel, Targetname]),
    ("prop_physics_override", &[Angles, StudioModel, Targetname]),
    ("prop_ragdoll", &[Angles, StudioModel, Targetname]),
    ("prop_static", &[Angles, StudioModel]),
    ("shadow_control", &[Targetname]),
    ("sky_camera", &[Angles]),
    ("trigger_hurt", &[Origin, Parentname, Targetname]),
    ("trigger_multiple", &[Origin, Parentname, Targetname]),
    ("trigger_once", &[Origin, Parentname, Targetname]),
    ("trigger_push", &[Origin, Parentname, Targetname]),
    ("trigger_teleport", &[Origin, Parentname, Targetname]),
    ("worldspawn", &[Targetname]),
];

pub fn class_capabilities(class_name: &str) -> FlagSet<EntityCapability> {
    CLASS_CAPABILITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(class_name))
        .map(|(_, caps)| caps.iter().fold(FlagSet::default(), |set, c| set | *c))
        .unwrap_or_default()
}

/// Space separated floats, tolerating doubled spaces.
pub fn parse_vector<const N: usize>(value: &str) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    let mut parts = value.split_whitespace();
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    Some(out)
}

/// Numeric keys that fail to parse read as zero.
pub fn parse_number(value: &str) -> f64 {
    value.trim().parse().unwrap_or(0.0)
}

/// One `{ ... }` block of the entity lump, keys lowercased, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pairs: Vec<(String, String)>,
}

impl Entity {
    pub fn from_pairs<K: AsRef<str>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, for repeated keys such as outputs.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        let key = key.to_ascii_lowercase();
        self.pairs
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn class_name(&self) -> Option<&str> {
        self.get("classname")
    }

    pub fn hammer_id(&self) -> Option<i64> {
        self.get("hammerid")?.trim().parse().ok()
    }

    pub fn capabilities(&self) -> FlagSet<EntityCapability> {
        self.class_name()
            .map(class_capabilities)
            .unwrap_or_default()
    }

    fn has(&self, capability: EntityCapability) -> bool {
        self.capabilities().contains(capability)
    }

    pub fn has_origin(&self) -> bool {
        self.has(Origin)
    }

    pub fn origin(&self) -> Option<Vec3> {
        if !self.has_origin() {
            return None;
        }
        let value = self.get("origin")?;
        let origin = parse_vector::<3>(value).map(Vec3::from);
        if origin.is_none() {
            log::warn!("unreadable origin {value:?} on {:?}", self.class_name());
        }
        origin
    }

    /// Pitch yaw roll in degrees, zero when the key is missing.
    pub fn angles(&self) -> Option<Vec3> {
        if !self.has(Angles) {
            return None;
        }
        let value = self.get("angles").unwrap_or("0 0 0");
        parse_vector::<3>(value).map(Vec3::from)
    }

    pub fn targetname(&self) -> Option<&str> {
        self.has(Targetname).then(|| self.get("targetname")).flatten()
    }

    pub fn parentname(&self) -> Option<&str> {
        self.has(Parentname).then(|| self.get("parentname")).flatten()
    }

    pub fn model(&self) -> Option<&str> {
        self.has(StudioModel).then(|| self.get("model")).flatten()
    }

    pub fn skin(&self) -> Option<i32> {
        self.has(StudioModel)
            .then(|| self.get("skin").map_or(0, |s| parse_number(s) as i32))
    }

    /// `_light` as colour and brightness.
    pub fn light(&self) -> Option<Vec4> {
        if !self.has(Light) {
            return None;
        }
        let value = self.get("_light").unwrap_or("255 255 255 200");
        parse_vector::<4>(value).map(Vec4::from)
    }

    /// The name other entities use to refer to this one.
    pub fn display_name(&self) -> String {
        match (self.get("targetname"), self.get("hammerid")) {
            (Some(name), _) => name.to_owned(),
            (None, Some(id)) => id.to_owned(),
            (None, None) => "missing_hammer_id".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Open,
    Close,
    Text(&'a str),
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn next(&mut self) -> Result<Option<(usize, Token<'a>)>> {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && (bytes[self.pos].is_ascii_whitespace() || bytes[self.pos] == 0) {
            self.pos += 1;
        }
        let start = self.pos;
        let Some(&b) = bytes.get(start) else {
            return Ok(None);
        };
        let token = match b {
            b'{' => {
                self.pos += 1;
                Token::Open
            }
            b'}' => {
                self.pos += 1;
                Token::Close
            }
            b'"' => {
                let len = self.text[start + 1..].find('"').ok_or_else(|| {
                    Error::assertion(start, "unterminated string in entity lump")
                })?;
                self.pos = start + 1 + len + 1;
                Token::Text(&self.text[start + 1..start + 1 + len])
            }
            _ => {
                let len = self.text[start..]
                    .find(|c: char| c.is_ascii_whitespace() || matches!(c, '{' | '}' | '"'))
                    .unwrap_or(self.text.len() - start);
                self.pos = start + len;
                Token::Text(&self.text[start..start + len])
            }
        };
        Ok(Some((start, token)))
    }
}

/// Parses the entity lump text into entities in file order.
pub fn parse_entities(text: &str) -> Result<Vec<Entity>> {
    let mut lexer = Lexer { text, pos: 0 };
    let mut entities = Vec::new();

    while let Some((offset, token)) = lexer.next()? {
        if token != Token::Open {
            return Err(Error::assertion(offset, format!("expected '{{', found {token:?}")));
        }
        let mut pairs = Vec::new();
        loop {
            match lexer.next()? {
                Some((_, Token::Close)) => break,
                Some((_, Token::Text(key))) => match lexer.next()? {
                    Some((_, Token::Text(value))) => {
                        pairs.push((key.to_ascii_lowercase(), value.to_owned()))
                    }
                    Some((at, token)) => {
                        return Err(Error::assertion(
                            at,
                            format!("key {key:?} followed by {token:?}"),
                        ))
                    }
                    None => return Err(Error::assertion(text.len(), "entity lump ends inside a key")),
                },
                Some((at, Token::Open)) => {
                    return Err(Error::assertion(at, "nested '{' in entity lump"))
                }
                None => return Err(Error::assertion(text.len(), "entity lump ends inside an entity")),
            }
        }
        entities.push(Entity { pairs });
    }
    Ok(entities)
}

#[derive(Debug, Clone, Default)]
pub struct BSPEntities {
    pub entities: Vec<Entity>,
}

impl BSPEntities {
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn by_class<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities
            .iter()
            .filter(move |e| e.class_name().is_some_and(|c| c.eq_ignore_ascii_case(class_name)))
    }

    pub fn find_by_targetname(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.get("targetname") == Some(name))
    }
}

impl LumpData for BSPEntities {
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        Some(match engine {
            BSPEngine::Source => LumpType::Entities as usize,
            BSPEngine::GoldSrc => GoldSrcLumpType::Entities as usize,
        })
    }

    fn parse(bsp: &BSPFile, id: usize) -> Result<Self> {
        let data = bsp.lump_reader(id)?;
        let text = String::from_utf8_lossy(data.as_slice());
        let entities = parse_entities(&text)?;
        log::debug!("{} entities", entities.len());
        Ok(Self { entities })
    }
}

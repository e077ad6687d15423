//! Line-oriented scene description parser.
//!
//! The format is a sequence of records introduced by `MATERIAL <id>`,
//! `OBJECT <id>`, `CAMERA`, or `ENVIRONMENT_MAP`, each followed by one
//! property per line until the next blank line or record header. Mesh
//! vertex data and environment pixels are attached programmatically after
//! parsing; file loading stays outside the core.

use glam::Vec3;
use thiserror::Error;

use super::{Camera, EnvironmentMap, Geom, GeomKind, Material, MaterialKind, Medium, Scene};

/// Scene text parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A record header or property line could not be interpreted.
    #[error("line {line}: {message}")]
    Malformed {
        /// 1-based source line.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// Material/object ids must appear in order starting at zero.
    #[error("line {line}: expected id {expected}, found {found}")]
    OutOfOrderId {
        /// 1-based source line.
        line: usize,
        /// Expected sequential id.
        expected: usize,
        /// Id found in the text.
        found: usize,
    },
    /// The text never declared a camera.
    #[error("scene text declares no CAMERA record")]
    MissingCamera,
}

fn malformed(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        line,
        message: message.into(),
    }
}

fn parse_f32(line: usize, token: &str) -> Result<f32, ParseError> {
    token
        .parse::<f32>()
        .map_err(|_| malformed(line, format!("expected a number, found `{token}`")))
}

fn parse_vec3(line: usize, tokens: &[&str]) -> Result<Vec3, ParseError> {
    if tokens.len() != 3 {
        return Err(malformed(line, "expected three components"));
    }
    Ok(Vec3::new(
        parse_f32(line, tokens[0])?,
        parse_f32(line, tokens[1])?,
        parse_f32(line, tokens[2])?,
    ))
}

fn parse_usize(line: usize, token: &str) -> Result<usize, ParseError> {
    token
        .parse::<usize>()
        .map_err(|_| malformed(line, format!("expected an index, found `{token}`")))
}

fn arg<'a>(line: usize, tokens: &[&'a str], key: &str) -> Result<&'a str, ParseError> {
    tokens
        .get(1)
        .copied()
        .ok_or_else(|| malformed(line, format!("{key} takes a value")))
}

/// Parse a scene description into a `Scene` with an empty mesh pool.
pub fn parse_scene(text: &str) -> Result<Scene, ParseError> {
    let mut materials: Vec<Material> = Vec::new();
    let mut geoms: Vec<Geom> = Vec::new();
    let mut camera: Option<Camera> = None;
    let mut environment: Option<EnvironmentMap> = None;

    #[derive(PartialEq)]
    enum Block {
        None,
        Material,
        Object,
        Camera,
        Environment,
    }
    let mut block = Block::None;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let key = tokens[0];

        match key {
            "MATERIAL" => {
                if tokens.len() != 2 {
                    return Err(malformed(line, "MATERIAL takes one id"));
                }
                let id = parse_usize(line, tokens[1])?;
                if id != materials.len() {
                    return Err(ParseError::OutOfOrderId {
                        line,
                        expected: materials.len(),
                        found: id,
                    });
                }
                materials.push(Material::diffuse(Vec3::ONE));
                block = Block::Material;
            }
            "OBJECT" => {
                if tokens.len() != 2 {
                    return Err(malformed(line, "OBJECT takes one id"));
                }
                let id = parse_usize(line, tokens[1])?;
                if id != geoms.len() {
                    return Err(ParseError::OutOfOrderId {
                        line,
                        expected: geoms.len(),
                        found: id,
                    });
                }
                geoms.push(Geom::new(GeomKind::Sphere, 0));
                block = Block::Object;
            }
            "CAMERA" => {
                camera = Some(Camera::new((0, 0), Vec3::ZERO, Vec3::ZERO));
                block = Block::Camera;
            }
            "ENVIRONMENT_MAP" => {
                environment = Some(EnvironmentMap {
                    width: 0,
                    height: 0,
                    pixels: Vec::new(),
                });
                block = Block::Environment;
            }
            _ => match block {
                Block::Material => {
                    let material = materials.last_mut().expect("inside MATERIAL block");
                    match key {
                        "RGB" => material.albedo = parse_vec3(line, &tokens[1..])?,
                        "SPECRGB" => material.specular = parse_vec3(line, &tokens[1..])?,
                        "REFRIOR" => material.ior = parse_f32(line, arg(line, &tokens, key)?)?,
                        "ROUGHNESS" => material.roughness = parse_f32(line, arg(line, &tokens, key)?)?,
                        "EMITTANCE" => {
                            material.emittance = parse_f32(line, arg(line, &tokens, key)?)?;
                            if material.emittance > 0.0 {
                                material.kind = MaterialKind::Emissive;
                            }
                        }
                        "TEXTURE" => material.texture = Some(parse_usize(line, arg(line, &tokens, key)?)?),
                        "MEDIUM" => {
                            if tokens.len() != 3 {
                                return Err(malformed(line, "MEDIUM takes sigma_t sigma_s"));
                            }
                            material.medium = Some(Medium {
                                sigma_t: parse_f32(line, tokens[1])?,
                                sigma_s: parse_f32(line, tokens[2])?,
                            });
                        }
                        "TYPE" => {
                            material.kind = match tokens.get(1).copied() {
                                Some("diffuse") => MaterialKind::Diffuse,
                                Some("spec_refl") => MaterialKind::SpecularReflect,
                                Some("spec_trans") => MaterialKind::SpecularTransmit,
                                Some("spec_fresnel") => MaterialKind::SpecularFresnel,
                                Some("microfacet") => MaterialKind::Microfacet,
                                Some("emissive") => MaterialKind::Emissive,
                                other => {
                                    return Err(malformed(
                                        line,
                                        format!("unknown material type `{}`", other.unwrap_or("")),
                                    ))
                                }
                            };
                        }
                        _ => return Err(malformed(line, format!("unknown material key `{key}`"))),
                    }
                }
                Block::Object => {
                    let geom = geoms.last_mut().expect("inside OBJECT block");
                    match key {
                        "sphere" => geom.kind = GeomKind::Sphere,
                        "cube" => geom.kind = GeomKind::Cube,
                        "mesh" => {
                            if tokens.len() != 3 {
                                return Err(malformed(line, "mesh takes start and count"));
                            }
                            geom.kind = GeomKind::Mesh {
                                triangle_start: parse_usize(line, tokens[1])?,
                                triangle_count: parse_usize(line, tokens[2])?,
                            };
                        }
                        "material" => geom.material = parse_usize(line, arg(line, &tokens, key)?)?,
                        "TRANS" => geom.translation = parse_vec3(line, &tokens[1..])?,
                        "ROTAT" => geom.rotation = parse_vec3(line, &tokens[1..])?,
                        "SCALE" => geom.scale = parse_vec3(line, &tokens[1..])?,
                        _ => return Err(malformed(line, format!("unknown object key `{key}`"))),
                    }
                }
                Block::Camera => {
                    let camera = camera.as_mut().expect("inside CAMERA block");
                    match key {
                        "RES" => {
                            if tokens.len() != 3 {
                                return Err(malformed(line, "RES takes width and height"));
                            }
                            camera.resolution = (
                                parse_usize(line, tokens[1])? as u32,
                                parse_usize(line, tokens[2])? as u32,
                            );
                        }
                        "FOVY" => camera.fov_y = parse_f32(line, arg(line, &tokens, key)?)?,
                        "EYE" => camera.position = parse_vec3(line, &tokens[1..])?,
                        "LOOKAT" => camera.look_at = parse_vec3(line, &tokens[1..])?,
                        "UP" => camera.up = parse_vec3(line, &tokens[1..])?,
                        "LENSRADIUS" => camera.lens_radius = parse_f32(line, arg(line, &tokens, key)?)?,
                        "FOCALDIST" => camera.focal_distance = parse_f32(line, arg(line, &tokens, key)?)?,
                        _ => return Err(malformed(line, format!("unknown camera key `{key}`"))),
                    }
                }
                Block::Environment => {
                    let env = environment.as_mut().expect("inside ENVIRONMENT_MAP block");
                    match key {
                        "RES" => {
                            if tokens.len() != 3 {
                                return Err(malformed(line, "RES takes width and height"));
                            }
                            env.width = parse_usize(line, tokens[1])? as u32;
                            env.height = parse_usize(line, tokens[2])? as u32;
                            env.pixels = vec![0.0; env.width as usize * env.height as usize * 3];
                        }
                        // Image data is attached by the caller; the FILE key
                        // is accepted and ignored so existing scene files load.
                        "FILE" => {}
                        _ => return Err(malformed(line, format!("unknown environment key `{key}`"))),
                    }
                }
                Block::None => {
                    return Err(malformed(line, format!("unexpected `{key}` outside a record")))
                }
            },
        }
    }

    let camera = camera.ok_or(ParseError::MissingCamera)?;
    let mut scene = Scene::new(camera);
    scene.materials = materials;
    scene.geoms = geoms;
    scene.environment = environment;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORNELL: &str = r#"
// Cornell box light
MATERIAL 0
RGB 1 1 1
EMITTANCE 5

MATERIAL 1
RGB .98 .98 .98
TYPE diffuse

MATERIAL 2
TYPE spec_fresnel
SPECRGB .98 .98 .98
REFRIOR 1.55

OBJECT 0
cube
material 0
TRANS 0 10 0
SCALE 3 .3 3

OBJECT 1
sphere
material 2
TRANS -1 4 -1
SCALE 2 2 2

CAMERA
RES 800 800
FOVY 45
EYE 0 5 10.5
LOOKAT 0 5 0
UP 0 1 0
"#;

    #[test]
    fn test_parse_cornell() {
        let scene = parse_scene(CORNELL).unwrap();
        assert_eq!(scene.materials.len(), 3);
        assert_eq!(scene.geoms.len(), 2);
        assert_eq!(scene.materials[0].kind, MaterialKind::Emissive);
        assert_eq!(scene.materials[0].emittance, 5.0);
        assert_eq!(scene.materials[2].kind, MaterialKind::SpecularFresnel);
        assert_eq!(scene.geoms[1].kind, GeomKind::Sphere);
        assert_eq!(scene.geoms[1].material, 2);
        assert_eq!(scene.camera.resolution, (800, 800));
        assert!(scene.environment.is_none());
    }

    #[test]
    fn test_parse_rejects_out_of_order_ids() {
        let text = "MATERIAL 1\nRGB 1 1 1\n\nCAMERA\nRES 4 4\n";
        match parse_scene(text) {
            Err(ParseError::OutOfOrderId { expected, found, .. }) => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("expected OutOfOrderId, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_requires_camera() {
        let text = "MATERIAL 0\nRGB 1 1 1\n";
        assert!(matches!(parse_scene(text), Err(ParseError::MissingCamera)));
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let text = "CAMERA\nRES 4 4\nBOGUS 1\n";
        assert!(matches!(parse_scene(text), Err(ParseError::Malformed { .. })));
    }

    #[test]
    fn test_parse_environment_record() {
        let text = "CAMERA\nRES 4 4\n\nENVIRONMENT_MAP\nRES 8 4\n";
        let scene = parse_scene(text).unwrap();
        let env = scene.environment.unwrap();
        assert_eq!((env.width, env.height), (8, 4));
        assert_eq!(env.pixels.len(), 8 * 4 * 3);
    }
}

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;

use crate::error::{Fuse3dError, Result};
use crate::geometry::{Mesh, VertexAttribute};

fn add_properties(element: &mut ElementDef, keys: &[&str], scalar: ScalarType) {
    keys.iter().for_each(|key| {
        element.properties.add(PropertyDef::new(
            key.to_string(),
            PropertyType::Scalar(scalar.clone()),
        ));
    });
}

fn colour_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Writes a mesh as an ASCII PLY file.
///
/// Positions and normals are always written. Vertex colours become `red green blue alpha`
/// bytes and texture coordinates become `s t` floats.
pub fn write_ply<P>(filepath: P, mesh: &Mesh) -> Result<()>
where
    P: AsRef<Path>,
{
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let mut vertex_element = ElementDef::new("vertex".to_string());
    add_properties(
        &mut vertex_element,
        &["x", "y", "z", "nx", "ny", "nz"],
        ScalarType::Float,
    );
    match mesh.attribute {
        VertexAttribute::Colours => add_properties(
            &mut vertex_element,
            &["red", "green", "blue", "alpha"],
            ScalarType::UChar,
        ),
        VertexAttribute::TextureCoordinates => {
            add_properties(&mut vertex_element, &["s", "t"], ScalarType::Float)
        }
    }

    let vertex_array = (0..mesh.len_vertices())
        .map(|i| {
            let mut elem = DefaultElement::new();
            let (position, normal) = (mesh.position(i), mesh.normal(i));
            for (k, key) in ["x", "y", "z"].iter().enumerate() {
                elem.insert(key.to_string(), Property::Float(position[k]));
            }
            for (k, key) in ["nx", "ny", "nz"].iter().enumerate() {
                elem.insert(key.to_string(), Property::Float(normal[k]));
            }

            let attribute = mesh.attribute_of(i);
            match mesh.attribute {
                VertexAttribute::Colours => {
                    for (k, key) in ["red", "green", "blue", "alpha"].iter().enumerate() {
                        elem.insert(key.to_string(), Property::UChar(colour_channel(attribute[k])));
                    }
                }
                VertexAttribute::TextureCoordinates => {
                    elem.insert("s".to_string(), Property::Float(attribute[0]));
                    elem.insert("t".to_string(), Property::Float(attribute[1]));
                }
            }
            elem
        })
        .collect::<Vec<_>>();

    ply.header.elements.add(vertex_element);
    ply.payload.insert("vertex".to_string(), vertex_array);

    let mut face_element = ElementDef::new("face".to_string());
    face_element.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    let face_array = mesh
        .indices
        .chunks_exact(3)
        .map(|face| {
            let mut elem = DefaultElement::new();
            elem.insert(
                "vertex_indices".to_string(),
                Property::ListInt(face.iter().map(|v| *v as i32).collect()),
            );
            elem
        })
        .collect::<Vec<_>>();
    ply.header.elements.add(face_element);
    ply.payload.insert("face".to_string(), face_array);

    ply.make_consistent()
        .map_err(|err| Fuse3dError::Parser(format!("inconsistent ply: {err:?}")))?;

    let mut buf = BufWriter::new(File::create(filepath)?);
    Writer::new().write_ply(&mut buf, &mut ply)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;
    use ply_rs::parser::Parser;
    use ply_rs::ply::{DefaultElement, Property};

    use super::*;
    use crate::geometry::MeshBuilder;

    fn coloured_triangle() -> Mesh {
        let mut builder = MeshBuilder::new(VertexAttribute::Colours);
        let normal = Vector3::z();
        let ids = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ]
        .map(|p| builder.add_vertex(&p, &normal, &[1.0, 0.5, 0.0, 1.0]));
        builder.add_triangle(ids);
        builder.build()
    }

    #[test]
    fn should_write_coloured_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.ply");
        write_ply(&path, &coloured_triangle()).unwrap();

        let mut file = std::fs::File::open(&path).unwrap();
        let ply = Parser::<DefaultElement>::new().read_ply(&mut file).unwrap();

        let vertices = &ply.payload["vertex"];
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1]["x"], Property::Float(1.0));
        assert_eq!(vertices[1]["nz"], Property::Float(1.0));
        assert_eq!(vertices[0]["red"], Property::UChar(255));
        assert_eq!(vertices[0]["green"], Property::UChar(128));
        assert_eq!(vertices[0]["blue"], Property::UChar(0));

        let faces = &ply.payload["face"];
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0]["vertex_indices"], Property::ListInt(vec![0, 1, 2]));
    }

    #[test]
    fn should_write_texture_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uv.ply");
        let mut builder = MeshBuilder::new(VertexAttribute::TextureCoordinates);
        builder.add_vertex(&Vector3::zeros(), &Vector3::z(), &[0.25, 0.75]);
        write_ply(&path, &builder.build()).unwrap();

        let mut file = std::fs::File::open(&path).unwrap();
        let ply = Parser::<DefaultElement>::new().read_ply(&mut file).unwrap();
        assert_eq!(ply.payload["vertex"][0]["t"], Property::Float(0.75));
        assert!(ply.payload["face"].is_empty());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_ply(dir.path().join("nope/mesh.ply"), &coloured_triangle());
        assert!(matches!(result, Err(Fuse3dError::Io(_))));
    }
}

use std::{io::Cursor, path::Path};

use scene_ngin::{
    SceneBuilder,
    builder::AssetImporter,
    cgmath::{Matrix4, Rad},
    config::ImportConfig,
    data_structures::{
        camera::OPENGL_TO_WGPU_MATRIX,
        fragment::{BoundTexture, IndexAccessor},
    },
    gpu::{Filter, IndexFormat, SamplerDesc, Topology, Wrap},
    resources::{Assets, gltf::GltfImporter},
};
use tempfile::TempDir;

use crate::common::test_utils::{
    GpuCall, RecordingGpu, assert_matrix_eq, camera, checker, sampler_key, scratch_dir, spec,
    texture_key, translation, vertex_array_key,
};

mod common;

const TRIANGLE: &str = r#"{
    "asset": { "version": "2.0" },
    "scene": 0,
    "scenes": [{ "name": "Scene", "nodes": [0, 2] }],
    "nodes": [
        { "name": "Root", "translation": [1, 0, 0], "children": [1] },
        { "name": "Triangle", "mesh": 0 },
        { "name": "Rig", "translation": [0, 0, 5], "children": [3] },
        { "name": "Camera", "camera": 0, "translation": [0, 1, 0] }
    ],
    "cameras": [{
        "type": "perspective",
        "perspective": { "yfov": 0.8, "znear": 0.1, "zfar": 100, "aspectRatio": 1.5 }
    }],
    "meshes": [{
        "name": "tri",
        "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
    }],
    "materials": [{ "name": "checker", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }],
    "textures": [{ "source": 0, "sampler": 0 }],
    "images": [{ "uri": "checker.png" }],
    "samplers": [{ "magFilter": 9728, "minFilter": 9728, "wrapS": 33071, "wrapT": 33071 }],
    "buffers": [{ "uri": "tri.bin", "byteLength": 44 }],
    "bufferViews": [
        { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
        { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }
    ],
    "accessors": [
        { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0] },
        { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
    ]
}"#;

/// Unnamed scene, no camera, one line-loop primitive.
const LINE_LOOP: &str = r#"{
    "asset": { "version": "2.0" },
    "scenes": [{ "nodes": [0] }],
    "nodes": [{ "mesh": 0 }],
    "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "mode": 2 }] }],
    "buffers": [{ "uri": "tri.bin", "byteLength": 44 }],
    "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
    "accessors": [
        { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0] }
    ]
}"#;

fn triangle_bin() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let indices: [u16; 3] = [0, 1, 2];
    let mut bin = Vec::with_capacity(44);
    for value in positions {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    for index in indices {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    bin.resize(44, 0);
    bin
}

fn checker_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(checker())
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

async fn write(root: &Path, uri: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(uri);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, contents).await.unwrap();
}

/// Writes the test models into a scratch dir. The dir lives as long as the
/// returned guard.
async fn model_dir(name: &str) -> (TempDir, Assets) {
    let dir = scratch_dir(name);
    let root = dir.path();
    write(root, "models/tri.gltf", TRIANGLE).await;
    write(root, "models/line.gltf", LINE_LOOP).await;
    write(root, "models/tri.bin", triangle_bin()).await;
    write(root, "models/checker.png", checker_png()).await;
    let assets = Assets::new(root);
    (dir, assets)
}

fn nearest_clamped() -> SamplerDesc {
    SamplerDesc {
        min_filter: Filter::Nearest,
        mag_filter: Filter::Nearest,
        wrap_u: Wrap::ClampToEdge,
        wrap_v: Wrap::ClampToEdge,
    }
}

#[tokio::test]
async fn should_upload_textures_and_primitives() {
    let (_dir, assets) = model_dir("gltf-upload").await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets);

    importer.load(&mut gpu, "models/tri.gltf").await.unwrap();

    assert_eq!(
        gpu.take(),
        vec![
            GpuCall::CreateTexture {
                label: "models/tri.gltf texture 0".to_string(),
                size: (2, 2),
                sampler: nearest_clamped(),
            },
            GpuCall::CreateSampler(nearest_clamped()),
            GpuCall::CreateVertexArray {
                label: "tri".to_string(),
                vertex_count: 3,
                texcoords: 0,
                normals: 0,
                indices: Some((3, IndexFormat::U16)),
            },
        ]
    );
}

#[tokio::test]
async fn should_expose_the_scene_hierarchy_by_name() {
    let (_dir, assets) = model_dir("gltf-scene").await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets);
    importer.load(&mut gpu, "models/tri.gltf").await.unwrap();

    assert_eq!(importer.scene_names().collect::<Vec<_>>(), ["Scene"]);
    let scene = importer.scene_by_name("Scene").unwrap();
    assert_eq!(scene.nodes.len(), 2);

    let root = &scene.nodes[0];
    assert_eq!(root.name.as_deref(), Some("Root"));
    assert_matrix_eq(&root.transform, &translation(1.0, 0.0, 0.0));
    assert!(root.mesh.is_none());

    let mesh = root.children[0].mesh.as_ref().unwrap();
    assert_eq!(mesh.name.as_deref(), Some("tri"));
    assert_eq!(mesh.primitives.len(), 1);
    let primitive = &mesh.primitives[0];
    assert_eq!(primitive.vertex_array, vertex_array_key(0));
    assert_eq!(primitive.topology, Topology::Triangles);
    assert_eq!(primitive.vertex_count, 3);
    assert_eq!(
        primitive.indices,
        Some(IndexAccessor {
            count: 3,
            format: IndexFormat::U16
        })
    );
    assert_eq!(primitive.material.name.as_deref(), Some("checker"));
    assert_eq!(
        primitive.material.base_color_texture,
        Some(BoundTexture {
            texture: texture_key(0),
            sampler: Some(sampler_key(0)),
        })
    );

    let rig = &scene.nodes[1];
    assert_eq!(rig.children[0].name.as_deref(), Some("Camera"));
    assert!(rig.children[0].mesh.is_none());
    assert!(importer.scene_by_name("Other").is_none());
}

#[tokio::test]
async fn should_expose_cameras_with_their_ancestors() {
    let (_dir, assets) = model_dir("gltf-camera").await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets);
    importer.load(&mut gpu, "models/tri.gltf").await.unwrap();

    let camera = importer.camera_by_name("Camera").unwrap();

    assert_matrix_eq(&camera.transform, &translation(0.0, 1.0, 0.0));
    assert_eq!(camera.ancestors.len(), 1);
    assert_matrix_eq(&camera.ancestors[0], &translation(0.0, 0.0, 5.0));
    assert_matrix_eq(&camera.global_transform(), &translation(0.0, 1.0, 5.0));
    let expected: Matrix4<f32> =
        OPENGL_TO_WGPU_MATRIX * scene_ngin::cgmath::perspective(Rad(0.8), 1.5, 0.1, 100.0);
    assert_matrix_eq(&camera.projection, &expected);
    let lens = camera.lens.unwrap();
    assert_eq!(lens.yfov, Rad(0.8));
    assert_eq!(lens.zfar, 100.0);
    assert_matrix_eq(&camera.projection_for(None), &expected);
    assert_matrix_eq(
        &camera.projection_for(Some(2.0)),
        &(OPENGL_TO_WGPU_MATRIX * scene_ngin::cgmath::perspective(Rad(0.8), 2.0, 0.1, 100.0)),
    );
    assert!(importer.camera_by_name("Rig").is_none());
}

#[tokio::test]
async fn should_forget_objects_of_the_previous_file() {
    let (_dir, assets) = model_dir("gltf-reload").await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets);
    importer.load(&mut gpu, "models/tri.gltf").await.unwrap();
    gpu.take();

    importer.load(&mut gpu, "models/line.gltf").await.unwrap();

    assert!(importer.scene_by_name("Scene").is_none());
    assert!(importer.camera_by_name("Camera").is_none());
    assert_eq!(importer.camera_names().count(), 0);

    let scene = importer.scene_by_name("scene0").unwrap();
    let mesh = scene.nodes[0].mesh.as_ref().unwrap();
    assert!(mesh.primitives.is_empty());
    assert!(gpu.creates().is_empty());
}

#[tokio::test]
async fn should_fail_on_missing_files() {
    let (_dir, assets) = model_dir("gltf-missing").await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets.clone());

    assert!(importer.load(&mut gpu, "models/none.gltf").await.is_err());

    tokio::fs::remove_file(assets.root().join("models/tri.bin"))
        .await
        .unwrap();
    assert!(importer.load(&mut gpu, "models/tri.gltf").await.is_err());
    assert!(importer.scene_by_name("Scene").is_none());
}

#[tokio::test]
async fn should_release_uploaded_textures_when_a_later_texture_fails() {
    let (_dir, assets) = model_dir("gltf-partial").await;
    let broken = TRIANGLE
        .replace(
            r#"{ "index": 0 } } }]"#,
            r#"{ "index": 0 } } }, { "pbrMetallicRoughness": { "baseColorTexture": { "index": 1 } } }]"#,
        )
        .replace(
            r#""textures": [{ "source": 0, "sampler": 0 }]"#,
            r#""textures": [{ "source": 0, "sampler": 0 }, { "source": 1 }]"#,
        )
        .replace(
            r#""images": [{ "uri": "checker.png" }]"#,
            r#""images": [{ "uri": "checker.png" }, { "uri": "missing.png" }]"#,
        );
    write(assets.root(), "models/broken.gltf", broken).await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets);

    assert!(importer.load(&mut gpu, "models/broken.gltf").await.is_err());

    assert!(importer.scene_by_name("Scene").is_none());
    assert_eq!(
        gpu.take(),
        vec![
            GpuCall::CreateTexture {
                label: "models/broken.gltf texture 0".to_string(),
                size: (2, 2),
                sampler: nearest_clamped(),
            },
            GpuCall::CreateSampler(nearest_clamped()),
            GpuCall::DestroyTexture(texture_key(0)),
            GpuCall::DestroySampler(sampler_key(0)),
        ]
    );
    assert_eq!(gpu.live(), (0, 0, 0));
}

#[tokio::test]
async fn should_reject_embedded_data_uris() {
    let (_dir, assets) = model_dir("gltf-data-uri").await;
    let embedded = TRIANGLE.replace(
        r#""uri": "tri.bin""#,
        r#""uri": "data:application/octet-stream;base64,AAAA""#,
    );
    write(assets.root(), "models/embedded.gltf", embedded).await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets);

    let err = importer
        .load(&mut gpu, "models/embedded.gltf")
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("data URIs"));
    assert!(gpu.calls.is_empty());
}

#[tokio::test]
async fn should_fail_on_malformed_documents() {
    let (_dir, assets) = model_dir("gltf-malformed").await;
    write(assets.root(), "models/broken.gltf", "{ \"asset\": ").await;
    let mut gpu = RecordingGpu::new();
    let mut importer = GltfImporter::new(assets);

    let err = importer
        .load(&mut gpu, "models/broken.gltf")
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("is not glTF"));
}

#[tokio::test]
async fn should_import_fragments_through_the_scene_builder() {
    let (_dir, assets) = model_dir("gltf-builder").await;
    let mut gpu = RecordingGpu::new();

    let scene = SceneBuilder::new(spec(vec![camera()]), GltfImporter::new(assets))
        .with_imports(ImportConfig {
            uris: vec![
                "models/none.gltf".to_string(),
                "models/line.gltf".to_string(),
                "models/tri.gltf".to_string(),
            ],
            ..Default::default()
        })
        .build(&mut gpu)
        .await
        .unwrap();

    assert_eq!(scene.len(), 1);
    assert_eq!(scene.fragments().len(), 1);
    let fragment = &scene.fragments()[0];
    assert_eq!(fragment.source, "models/tri.gltf");
    assert_eq!(fragment.scene.nodes.len(), 2);
    assert_matrix_eq(&fragment.camera.global_transform(), &translation(0.0, 1.0, 5.0));
}

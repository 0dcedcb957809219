mod common;

use std::io::{Cursor, Write};

use classfile_decompiler::{
    decompile_named, CachingLoader, DecompileError, DecompilerConfig, DirectoryLoader, JarLoader, Loader,
};
use common::*;
use zip::write::SimpleFileOptions;

fn jar(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    writer.add_directory("META-INF/", options).unwrap();
    writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
    writer.write_all(b"Manifest-Version: 1.0\r\n\r\n").unwrap();
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn quiet() -> DecompilerConfig {
    DecompilerConfig {
        write_metadata: false,
        ..Default::default()
    }
}

#[test]
fn jar_lists_only_classes() {
    let bytes = jar(&[
        ("com/example/Hello.class", hello_class()),
        ("com/example/Spin.class", loop_class()),
        ("com/example/readme.txt", b"hi".to_vec()),
    ]);
    let loader = JarLoader::from_bytes(&bytes).unwrap();
    let names: Vec<&str> = loader.class_names().collect();
    assert_eq!(names, vec!["com/example/Hello", "com/example/Spin"]);
    assert!(loader.can_load("com/example/Hello"));
    assert!(!loader.can_load("com/example/readme"));
    assert!(matches!(
        loader.load("com/example/Missing"),
        Err(DecompileError::ClassNotFound { .. })
    ));
}

#[test]
fn decompile_from_jar_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.jar");
    std::fs::write(&path, jar(&[("com/example/Hello.class", hello_class())])).unwrap();

    let loader = JarLoader::open(&path).unwrap();
    let text = decompile_named("com/example/Hello", &loader, &DecompilerConfig::default()).unwrap();
    assert!(text.starts_with("package com.example;"), "{text}");
    assert!(text.contains("return a + b;"), "{text}");
    assert!(text.contains("Location:              com/example/Hello.class"), "{text}");
}

#[test]
fn not_a_jar() {
    assert!(matches!(
        JarLoader::from_bytes(b"plain text"),
        Err(DecompileError::Zip(_))
    ));
}

#[test]
fn directory_classpath() {
    let dir = tempfile::tempdir().unwrap();
    let package = dir.path().join("com").join("example");
    std::fs::create_dir_all(&package).unwrap();
    std::fs::write(package.join("Hello.class"), hello_class()).unwrap();

    let loader = DirectoryLoader::new(dir.path());
    assert!(loader.can_load("com/example/Hello"));
    assert!(!loader.can_load("com/example/Other"));
    let text = decompile_named("com/example/Hello", &loader, &quiet()).unwrap();
    assert!(text.contains("public class Hello {"), "{text}");
}

#[test]
fn cache_outlives_source() {
    let dir = tempfile::tempdir().unwrap();
    let package = dir.path().join("com").join("example");
    std::fs::create_dir_all(&package).unwrap();
    let file = package.join("Hello.class");
    std::fs::write(&file, hello_class()).unwrap();

    let loader = CachingLoader::new(DirectoryLoader::new(dir.path()), 8);
    let first = decompile_named("com/example/Hello", &loader, &quiet()).unwrap();
    std::fs::remove_file(&file).unwrap();
    assert!(loader.can_load("com/example/Hello"));
    let second = decompile_named("com/example/Hello", &loader, &quiet()).unwrap();
    assert_eq!(first, second);
    assert!(!loader.inner().can_load("com/example/Hello"));
}

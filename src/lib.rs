//! A parser and decompiler for [Java Classfiles](https://docs.oracle.com/javase/specs/jvms/se10/html/jvms-4.html)
//!
//! ```rust,no_run
//! use classfile_decompiler::{decompile_named, DecompilerConfig, DirectoryLoader};
//!
//! let loader = DirectoryLoader::new("./target/classes");
//! let source = decompile_named("com/example/Main", &loader, &DecompilerConfig::default()).unwrap();
//! println!("{}", source);
//! ```

use std::fs::File;
use std::io::{prelude::*, BufReader};
use std::path::Path;

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod constant_info;
pub mod field_info;
pub mod method_info;

pub mod code_attribute;

pub mod parser;
pub mod types;

pub mod cache;
pub mod config;
pub mod decompile;
pub mod error;
pub mod loader;
pub mod printer;

pub use config::{DecompileEngine, DecompilerConfig};
pub use decompile::{decompile_named, decompile_to_printer, decompile_to_string, ClassDecompiler};
pub use error::{DecompileError, Result};
pub use loader::{CachingLoader, DirectoryLoader, JarLoader, Loader, MapLoader, NullLoader};
pub use parser::class_parser;
pub use printer::{PlainTextPrinter, Printer};
pub use types::*;

/// Attempt to parse a class file given a path to a class file (without .class extension)
///
/// ```rust,no_run
/// match classfile_decompiler::parse_class("./target/classes/com/example/Main") {
///     Ok(class_file) => {
///         println!("version {},{}", class_file.major_version, class_file.minor_version);
///     }
///     Err(ex) => panic!("Failed to parse: {}", ex),
/// };
/// ```
pub fn parse_class(class_name: &str) -> Result<ClassFile> {
    let path = format!("{}.class", class_name);
    let file = File::open(Path::new(&path))?;
    let mut reader = BufReader::new(file);
    parse_class_from_reader(&mut reader)
}

/// Attempt to parse a class file from anything implementing `std::io::Read`.
///
/// ```rust
/// let mut reader = "this_will_be_parsed_as_classfile".as_bytes();
/// let result = classfile_decompiler::parse_class_from_reader(&mut reader);
/// assert!(result.is_err());
/// ```
pub fn parse_class_from_reader<T: Read>(reader: &mut T) -> Result<ClassFile> {
    let mut class_bytes = Vec::new();
    reader.read_to_end(&mut class_bytes)?;
    ClassFile::parse(&class_bytes)
}

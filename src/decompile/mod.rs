//! Bytecode to Java source.
//!
//! Method bodies go through stack simulation ([`builder`]), basic block
//! construction ([`cfg`]), structuring ([`reducer`]) and statement
//! reconstruction ([`reconstruct`]). The [`writer`] lays the class out as
//! tokens and [`layout`] sizes the blank lines between them.

pub mod builder;
pub mod cfg;
pub mod class_decompiler;
pub mod descriptor;
pub mod expr;
pub mod instruction;
pub mod layout;
pub mod locals;
pub mod reconstruct;
pub mod reducer;
pub mod type_resolver;
pub mod writer;

pub use self::class_decompiler::{
    decompile_named, decompile_to_printer, decompile_to_string, ClassDecompiler, DecompiledClass, DecompiledMethod,
    MethodBody,
};
pub use self::layout::{Fragment, LayoutBlock, LayoutTag};
pub use self::writer::{internal_error_placeholder, DECOMPILER_VERSION};

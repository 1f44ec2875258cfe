//! ELF image loading (§12): write every loadable segment of an ELF file
//! into guest [`Memory`] at its program-header virtual address, and
//! return the entry point so the CLI can seed `pc` without a separate
//! `--entry` flag in the common case.
//!
//! Generalizes the reference `elf_utils.rs`'s "return a `Vec<u32>` of
//! `.text` words" to cover `.rodata`/`.data`-backed loads too — the
//! debugger's `x`/`p *addr` commands need more than `.text` to read
//! meaningful values.

use elf::abi::PT_LOAD;
use elf::endian::AnyEndian;
use elf::ElfBytes;
use thiserror::Error;

use crate::memory::Memory;

#[derive(Error, Debug)]
pub enum ElfLoadError {
    #[error("could not read ELF file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed ELF file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: elf::ParseError,
    },
}

/// Load every `PT_LOAD` segment of the ELF file at `path` into `mem` at
/// its program-header virtual address, and return the file's entry
/// point (`e_entry`).
pub fn load_elf(path: &str, mem: &mut Memory) -> Result<u32, ElfLoadError> {
    let bytes = std::fs::read(path).map_err(|source| ElfLoadError::Io {
        path: path.to_string(),
        source,
    })?;
    let file =
        ElfBytes::<AnyEndian>::minimal_parse(&bytes).map_err(|source| ElfLoadError::Parse {
            path: path.to_string(),
            source,
        })?;

    let segments = file.segments().into_iter().flatten();
    for phdr in segments {
        if phdr.p_type != PT_LOAD || phdr.p_filesz == 0 {
            continue;
        }
        let start = phdr.p_offset as usize;
        let end = start + phdr.p_filesz as usize;
        let data = &bytes[start..end];
        mem.load_bytes(phdr.p_vaddr as u32, data);
    }

    Ok(file.ehdr.e_entry as u32)
}

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use proc_macro2::{Literal, TokenStream};
use quote::format_ident;
use quote::quote;

mod build_serde;
// Structures imported from build_serde.rs
use build_serde::{BitField, PrsVariant};

/// Variants generated into `prs_variants.rs`, in output order.
const PRS_VARIANTS: &[&str] = &["compact", "standard", "extended"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=build_serde.rs");
    println!("cargo:rerun-if-changed=data/prs");
    let data_dir = Path::new("data").join("prs");

    let mut token_stream = TokenStream::new();

    for variant_name in PRS_VARIANTS {
        let path = data_dir.join(format!("{}.yaml", variant_name));
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let variant: PrsVariant = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

        check_variant(&variant).map_err(|e| format!("{}: {}", path.display(), e))?;
        token_stream.extend(generate_variant(&variant));
    }

    // Get output path from env
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let dest_path = out_dir.join("prs_variants.rs");

    let mut file = File::create(&dest_path)?;
    write!(file, "{}", token_stream)?;
    rustfmt(&dest_path);

    Ok(())
}

/// Reject tables the hardware could not encode.
fn check_variant(variant: &PrsVariant) -> Result<(), String> {
    let ctrl = &variant.channel_ctrl;
    check_field("sigsel", &ctrl.sigsel)?;
    check_field("sourcesel", &ctrl.sourcesel)?;
    let sigsel_end = ctrl.sigsel.bit_offset + ctrl.sigsel.bit_size;
    let sourcesel_end = ctrl.sourcesel.bit_offset + ctrl.sourcesel.bit_size;
    if sigsel_end > ctrl.sourcesel.bit_offset && sourcesel_end > ctrl.sigsel.bit_offset {
        return Err("sigsel and sourcesel overlap".to_string());
    }
    if variant.channels == 0 || variant.channels > 16 {
        return Err(format!("unsupported channel count {}", variant.channels));
    }
    if ctrl.byte_offset % 4 != 0 {
        return Err(format!("misaligned channel_ctrl offset {:#x}", ctrl.byte_offset));
    }

    let mut source_ids = BTreeSet::new();
    for source in &variant.sources {
        if source.id == 0 {
            return Err(format!("{}: source id 0 is reserved for NONE", source.source));
        }
        if u32::from(source.id) >= 1 << ctrl.sourcesel.bit_size {
            return Err(format!("{}: source id {:#x} does not fit sourcesel", source.source, source.id));
        }
        if !source_ids.insert(source.id) {
            return Err(format!("duplicate source id {:#x}", source.id));
        }

        let mut signal_ids = BTreeSet::new();
        for signal in &source.signals {
            if u32::from(signal.id) >= 1 << ctrl.sigsel.bit_size {
                return Err(format!(
                    "{}.{}: signal id {:#x} does not fit sigsel",
                    source.source, signal.signal, signal.id
                ));
            }
            if !signal_ids.insert(signal.id) {
                return Err(format!("{}: duplicate signal id {:#x}", source.source, signal.id));
            }
        }
    }

    let mut consumers = BTreeSet::new();
    for consumer in &variant.consumers {
        if !consumers.insert(consumer) {
            return Err(format!("duplicate consumer {}", consumer));
        }
    }
    Ok(())
}

fn check_field(name: &str, field: &BitField) -> Result<(), String> {
    if field.bit_size == 0 || u32::from(field.bit_offset) + u32::from(field.bit_size) > 32 {
        return Err(format!(
            "{} field {}+{} does not fit a 32-bit register",
            name, field.bit_offset, field.bit_size
        ));
    }
    Ok(())
}

fn generate_variant(variant: &PrsVariant) -> TokenStream {
    let name_ident = format_ident!("{}", variant.name);
    let name_str = variant.name.to_lowercase();
    let doc = variant
        .description
        .clone()
        .unwrap_or_else(|| format!("{} PRS variant.", variant.name));
    let channels = Literal::usize_unsuffixed(variant.channels as usize);
    let ipversion = Literal::u32_unsuffixed(variant.ipversion);
    let ctrl_offset = Literal::u32_unsuffixed(variant.channel_ctrl.byte_offset);
    let sigsel = generate_field(&variant.channel_ctrl.sigsel);
    let sourcesel = generate_field(&variant.channel_ctrl.sourcesel);

    let sources = variant.sources.iter().map(|source| {
        let source_ident = format_ident!("{}", source.source);
        let id = Literal::u8_unsuffixed(source.id);
        let signals = source.signals.iter().map(|signal| {
            let signal_ident = format_ident!("{}", signal.signal);
            let id = Literal::u8_unsuffixed(signal.id);
            quote! {
                SignalEntry { id: #id, signal: Signal::#signal_ident }
            }
        });
        quote! {
            SourceEntry {
                id: #id,
                source: Source::#source_ident,
                signals: &[#(#signals),*],
            }
        }
    });

    let consumers = variant.consumers.iter().map(|consumer| {
        let consumer_ident = format_ident!("{}", consumer);
        quote! { ConsumerKind::#consumer_ident }
    });

    quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct #name_ident;

        impl Variant for #name_ident {
            const NAME: &'static str = #name_str;
            const CHANNELS: usize = #channels;
            const IPVERSION: u32 = #ipversion;
            const CH_CTRL_OFFSET: u32 = #ctrl_offset;
            const SIGSEL: Field = #sigsel;
            const SOURCESEL: Field = #sourcesel;
            const SOURCES: &'static [SourceEntry] = &[#(#sources),*];
            const CONSUMERS: &'static [ConsumerKind] = &[#(#consumers),*];
        }
    }
}

fn generate_field(field: &BitField) -> TokenStream {
    let offset = Literal::u8_unsuffixed(field.bit_offset);
    let width = Literal::u8_unsuffixed(field.bit_size);
    quote! { Field::new(#offset, #width) }
}

/// rustfmt a given path.
/// Failures are logged to stderr and ignored.
fn rustfmt(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match Command::new("rustfmt").args([path]).output() {
        Err(e) => {
            eprintln!("failed to exec rustfmt {:?}: {:?}", path, e);
        }
        Ok(out) => {
            if !out.status.success() {
                eprintln!("rustfmt {:?} failed:", path);
                eprintln!("=== STDOUT:");
                let _ = std::io::stderr().write_all(&out.stdout);
                eprintln!("=== STDERR:");
                let _ = std::io::stderr().write_all(&out.stderr);
            }
        }
    }
}

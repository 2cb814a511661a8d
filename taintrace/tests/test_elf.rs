use std::env::current_exe;
use std::fs::read;

use taintrace::elf::{function_symbols, load_segments, Symbol};
use taintrace::replay::{Recording, ReplayDebugger};
use taintrace::Debugger;

fn own_image() -> Vec<u8> {
    read(current_exe().unwrap()).unwrap()
}

#[test]
fn test_load_segments_self() {
    let regions = load_segments(&own_image()).unwrap();
    assert!(!regions.is_empty());
    assert!(regions.iter().all(|r| !r.bytes.is_empty()));
}

#[test]
fn test_function_symbols_sorted() {
    let symbols = function_symbols(&own_image()).unwrap();
    assert!(!symbols.is_empty());
    assert!(symbols.windows(2).all(|w| w[0].address < w[1].address));
    assert!(symbols.iter().all(|s| s.address != 0 && !s.name.is_empty()));
}

#[test]
fn test_garbage_is_rejected() {
    assert!(load_segments(b"not an executable").is_err());
    assert!(function_symbols(&[0u8; 64]).is_err());
}

#[test]
fn test_symbol_contains() {
    let sym = Symbol {
        address: 0x1000,
        size: 0x10,
        name: "f".to_string(),
    };
    assert!(sym.contains(0x1000));
    assert!(sym.contains(0x100f));
    assert!(!sym.contains(0x1010));
    assert!(!sym.contains(0xfff));

    let unsized_sym = Symbol { size: 0, ..sym };
    assert!(unsized_sym.contains(0x1000));
    assert!(!unsized_sym.contains(0x1001));
}

#[test]
fn test_recording_maps_binary() {
    let recording = Recording {
        binary: Some(current_exe().unwrap()),
        ..Recording::default()
    };
    let mut debugger = ReplayDebugger::from_recording(&recording).unwrap();
    let regions = load_segments(&own_image()).unwrap();
    let first = &regions[0];
    assert_eq!(
        debugger.read_memory(first.address, 4).unwrap(),
        first.bytes[..4].to_vec()
    );

    let symbols = function_symbols(&own_image()).unwrap();
    let sym = symbols.iter().find(|s| s.size > 0).unwrap();
    let func = debugger.function_at(sym.address).unwrap();
    assert_eq!(func.start, sym.address);
}

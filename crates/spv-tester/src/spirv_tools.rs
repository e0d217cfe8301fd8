//! Runs the SPIRV-Tools command line programs on edited modules. Missing programs are reported
//! and skipped, so the tester also works without SPIRV-Tools installed.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use spv_editor::{rspirv::spirv::Word, HEADER_WORDS};

///Instructions shown before and after a differing one.
const CONTEXT_LINES: usize = 4;

///Pipes `spirv` into `program`. Returns `None` if the program could not be started.
fn run_tool(program: &str, args: &[&str], spirv: &[Word]) -> Result<Option<Output>, String> {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Failed to spawn {}, skipping: {}", program, e);
            return Ok(None);
        }
    };

    let code: Vec<u8> = bytemuck::cast_slice(spirv).to_vec();
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| format!("Failed to open stdin of {}", program))?;
    let writer = std::thread::spawn(move || stdin.write_all(&code));

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to run {}: {}", program, e))?;
    if let Ok(Err(e)) = writer.join() {
        log::warn!("Could not write module to {}: {}", program, e);
    }
    Ok(Some(output))
}

///Runs `spirv-val`. Passes if the module is valid or the validator is not installed.
pub fn validate(spirv: &[Word]) -> Result<(), String> {
    match run_tool("spirv-val", &[], spirv)? {
        Some(output) if !output.status.success() => {
            Err(String::from_utf8_lossy(&output.stderr).to_string())
        }
        _ => Ok(()),
    }
}

///Index of the instruction covering `word`. Header words map to the first instruction.
fn instruction_index(spirv: &[Word], word: usize) -> usize {
    let mut offset = HEADER_WORDS;
    let mut index = 0;
    while offset < spirv.len() {
        let word_count = ((spirv[offset] >> 16) as usize).max(1);
        if word < offset + word_count {
            break;
        }
        offset += word_count;
        index += 1;
    }
    index
}

///Disassembles the instructions around the one containing `word`, marking that one.
pub fn disassemble_around(spirv: &[Word], word: usize) -> String {
    let output = match run_tool("spirv-dis", &["--no-header", "--no-color", "--raw-id"], spirv) {
        Ok(Some(output)) if output.status.success() => output,
        Ok(Some(output)) => return String::from_utf8_lossy(&output.stderr).to_string(),
        Ok(None) => return String::from("No spirv-dis"),
        Err(e) => return e,
    };

    //without header every line is one instruction
    let target = instruction_index(spirv, word);
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .enumerate()
        .skip(target.saturating_sub(CONTEXT_LINES))
        .take(2 * CONTEXT_LINES + 1)
        .map(|(index, line)| {
            let marker = if index == target { ">" } else { " " };
            format!("{} {:5}: {}\n", marker, index, line)
        })
        .collect()
}

//! Decode command implementation.

use pagesync_protocol::{Checksum, ItemIndex, SyncMessage};
use serde::Serialize;
use std::path::Path;

/// Decoded view of one frame.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Frame size in bytes.
    pub size: usize,
    /// Type code (first byte).
    pub type_code: u8,
    /// Packet name.
    pub packet: &'static str,
    /// Channel suffix the packet travels on.
    pub channel: &'static str,
    /// Side that sends this packet.
    pub sender: &'static str,
    /// Page id.
    pub page: u64,
    /// Existence flag of responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_exists: Option<bool>,
    /// Removal flag of pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_removed: Option<bool>,
    /// Advertised or pushed checksums.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checksums: Vec<ItemChecksum>,
    /// Requested indices.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<ItemIndex>,
    /// Delivered payloads.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub payloads: Vec<ItemPayload>,
    /// Removed indices.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_indices: Vec<ItemIndex>,
}

/// An index with its checksum.
#[derive(Debug, Serialize)]
pub struct ItemChecksum {
    /// Item index.
    pub index: ItemIndex,
    /// Checksum in hex.
    pub checksum: String,
}

/// Summary of one delivered payload.
#[derive(Debug, Serialize)]
pub struct ItemPayload {
    /// Item index.
    pub index: ItemIndex,
    /// Encoded size in bytes.
    pub size: usize,
    /// Checksum of the encoded bytes, in hex.
    pub checksum: String,
}

impl FrameInfo {
    /// Builds the view of a decoded message.
    pub fn from_message(size: usize, message: &SyncMessage) -> Self {
        let mut info = FrameInfo {
            size,
            type_code: message.type_code(),
            packet: message.name(),
            channel: message.channel().suffix(),
            sender: message.sender().as_str(),
            page: message.page(),
            page_exists: None,
            was_removed: None,
            checksums: Vec::new(),
            indices: Vec::new(),
            payloads: Vec::new(),
            removed_indices: Vec::new(),
        };

        match message {
            SyncMessage::ChecksumRequest(_) => {}
            SyncMessage::ChecksumResponse(m) => {
                info.page_exists = Some(m.page_exists);
                info.checksums = checksum_list(&m.checksums);
            }
            SyncMessage::DataDiffRequest(m) => {
                info.indices = m.indices.clone();
            }
            SyncMessage::DataDiffResponse(m) => {
                info.page_exists = Some(m.page_exists);
                info.payloads = m
                    .new_data
                    .iter()
                    .map(|(index, bytes)| ItemPayload {
                        index: *index,
                        size: bytes.len(),
                        checksum: Checksum::of(bytes).to_hex(),
                    })
                    .collect();
                info.removed_indices = m.removed_indices.clone();
            }
            SyncMessage::ChecksumsUpdated(m) => {
                info.was_removed = Some(m.was_removed);
                info.checksums = checksum_list(&m.updated);
                info.removed_indices = m.removed_indices.clone();
            }
        }
        info
    }
}

fn checksum_list(pairs: &[(ItemIndex, Checksum)]) -> Vec<ItemChecksum> {
    pairs
        .iter()
        .map(|(index, checksum)| ItemChecksum {
            index: *index,
            checksum: checksum.to_hex(),
        })
        .collect()
}

/// Runs the decode command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let frame = std::fs::read(path)
        .map_err(|e| format!("Cannot read frame file {:?}: {}", path, e))?;
    let message = SyncMessage::decode_frame(&frame)?;
    let info = FrameInfo::from_message(frame.len(), &message);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        _ => {
            print_text_output(&info);
        }
    }

    Ok(())
}

fn print_text_output(info: &FrameInfo) {
    println!("=== {} ===", info.packet);
    println!();
    println!("Type code:  {}", info.type_code);
    println!("Channel:    {}", info.channel);
    println!("Sender:     {}", info.sender);
    println!("Frame size: {} bytes", info.size);
    println!("Page:       {}", info.page);
    if let Some(exists) = info.page_exists {
        println!("Exists:     {}", exists);
    }
    if let Some(removed) = info.was_removed {
        println!("Removed:    {}", removed);
    }

    if !info.checksums.is_empty() {
        println!();
        println!("Checksums ({}):", info.checksums.len());
        for item in &info.checksums {
            println!("  {:>10}  {}", item.index, item.checksum);
        }
    }
    if !info.indices.is_empty() {
        println!();
        println!("Requested indices: {:?}", info.indices);
    }
    if !info.payloads.is_empty() {
        println!();
        println!("Payloads ({}):", info.payloads.len());
        for item in &info.payloads {
            println!("  {:>10}  {:>8} bytes  {}", item.index, item.size, item.checksum);
        }
    }
    if !info.removed_indices.is_empty() {
        println!();
        println!("Removed indices: {:?}", info.removed_indices);
    }
}

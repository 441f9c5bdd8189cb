use gimli::constants::{self, DwForm};

use crate::file::Sections;
use crate::reader::{read_sleb128, read_uleb128, Cursor};
use crate::Result;

/// Decode one attribute value according to its declared form, returning the
/// raw bytes. The cursor advances by exactly the encoded width; string-table
/// references resolve elsewhere in the file and only consume their 4-byte
/// offset.
///
/// An unrecognized form yields an empty vector so that the attribute simply
/// has no value; a variable-length integer that overflows is fatal.
pub fn read_form(
    cur: &mut Cursor,
    form: DwForm,
    address_size: u8,
    sections: &Sections,
) -> Result<Vec<u8>> {
    let mut data = Vec::new();

    match form {
        constants::DW_FORM_string => {
            data.extend_from_slice(cur.read_cstr()?);
        }

        constants::DW_FORM_block1 => {
            let len = cur.read_u8()? as usize;
            data.extend_from_slice(cur.read_bytes(len)?);
        }

        constants::DW_FORM_block2 => {
            let len = cur.read_u16()? as usize;
            data.extend_from_slice(cur.read_bytes(len)?);
        }

        constants::DW_FORM_strp => {
            // The value lives in the string section; only the 4-byte offset
            // is consumed here.
            let offset = cur.read_u32()? as usize;
            let mut str_cur = *cur;
            str_cur.set_pos(sections.str_.offset + offset);
            data.extend_from_slice(str_cur.read_cstr()?);
        }

        constants::DW_FORM_data1 | constants::DW_FORM_flag => {
            data.push(cur.read_u8()?);
        }

        constants::DW_FORM_data2 => {
            data.extend_from_slice(&cur.read_u16()?.to_le_bytes());
        }

        constants::DW_FORM_data4 | constants::DW_FORM_ref4 | constants::DW_FORM_sec_offset => {
            data.extend_from_slice(&cur.read_u32()?.to_le_bytes());
        }

        constants::DW_FORM_data8 | constants::DW_FORM_ref8 => {
            data.extend_from_slice(&cur.read_u64()?.to_le_bytes());
        }

        constants::DW_FORM_addr => {
            if address_size == 8 {
                data.extend_from_slice(&cur.read_u64()?.to_le_bytes());
            } else {
                data.extend_from_slice(&cur.read_u32()?.to_le_bytes());
            }
        }

        constants::DW_FORM_udata | constants::DW_FORM_ref_udata => {
            let mut value = read_uleb128(cur)?;
            loop {
                data.push((value & 0xff) as u8);
                value >>= 8;
                if value == 0 {
                    break;
                }
            }
        }

        constants::DW_FORM_sdata => {
            let value = read_sleb128(cur)?;
            data.extend_from_slice(&value.to_le_bytes());
        }

        constants::DW_FORM_exprloc => {
            let len = read_uleb128(cur)? as usize;
            data.extend_from_slice(cur.read_bytes(len)?);
        }

        constants::DW_FORM_flag_present => {
            data.push(1);
        }

        _ => {
            debug!("unsupported attribute form {}", form);
        }
    }

    Ok(data)
}

/// Accumulate raw attribute bytes into an unsigned little-endian value.
pub(crate) fn value_u64(data: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, &byte) in data.iter().take(8).enumerate() {
        value |= u64::from(byte) << (i * 8);
    }
    value
}

//! The three USB HID reports the periphery presents to the far PC: a boot
//! keyboard, a relative mouse, and an absolute mouse, composited behind one
//! `usb-device` class. Keyboard has no report ID; the two mouse reports are
//! distinguished by report IDs 1 and 2, matching their USB endpoint index
//! (§4.7).

use usbd_hid::descriptor::generator_prelude::*;
use usbd_hid::descriptor::{AsInputReport, SerializedDescriptor};

/// 8-byte USB HID boot keyboard report: modifier byte, a reserved OEM byte,
/// and a 6-key rollover array.
#[gen_hid_descriptor(
    (collection = APPLICATION, usage_page = GENERIC_DESKTOP, usage = KEYBOARD) = {
        (usage_page = KEYBOARD, usage_min = 0xE0, usage_max = 0xE7, logical_min = 0) = {
            #[packed_bits 8] #[item_settings data,variable,absolute] modifier=input;
        };
        (report_count = 1, report_size = 8) = {
            #[item_settings constant,variable,absolute] reserved=input;
        };
        (usage_page = KEYBOARD, usage_min = 0x00, usage_max = 0xFF, logical_min = 0, logical_max = 0xFF) = {
            #[item_settings data,array,absolute] keys=input;
        };
    }
)]
#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub struct KeyboardReport {
    pub modifier: u8,
    pub reserved: u8,
    pub keys: [u8; 6],
}

/// Report ID 1: relative mouse. 3-bit button mask, i8 dx/dy, i8 wheel.
#[gen_hid_descriptor(
    (collection = APPLICATION, usage_page = GENERIC_DESKTOP, usage = MOUSE) = {
        (collection = PHYSICAL, usage = POINTER) = {
            (report_id = 0x01,) = {};
            (usage_page = BUTTON, usage_min = 1, usage_max = 3, logical_min = 0, logical_max = 1) = {
                #[packed_bits 3] #[item_settings data,variable,absolute] buttons=input;
            };
            (usage_page = GENERIC_DESKTOP, usage = X, usage = Y, logical_min = -127, logical_max = 127) = {
                #[item_settings data,variable,relative] x=input;
                #[item_settings data,variable,relative] y=input;
            };
            (usage = WHEEL, logical_min = -127, logical_max = 127) = {
                #[item_settings data,variable,relative] wheel=input;
            };
        };
    }
)]
#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub struct RelativeMouseReport {
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
}

/// Report ID 2: absolute mouse. 3-bit button mask, u16 x/y (0..32767), i8
/// wheel. Used for pointer warps the relative report cannot express cleanly.
#[gen_hid_descriptor(
    (collection = APPLICATION, usage_page = GENERIC_DESKTOP, usage = MOUSE) = {
        (collection = PHYSICAL, usage = POINTER) = {
            (report_id = 0x02,) = {};
            (usage_page = BUTTON, usage_min = 1, usage_max = 3, logical_min = 0, logical_max = 1) = {
                #[packed_bits 3] #[item_settings data,variable,absolute] buttons=input;
            };
            (usage_page = GENERIC_DESKTOP, usage = X, usage = Y, logical_min = 0, logical_max = 0x7FFF) = {
                #[item_settings data,variable,absolute] x=input;
                #[item_settings data,variable,absolute] y=input;
            };
            (usage = WHEEL, logical_min = -127, logical_max = 127) = {
                #[item_settings data,variable,relative] wheel=input;
            };
        };
    }
)]
#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub struct AbsoluteMouseReport {
    pub buttons: u8,
    pub x: u16,
    pub y: u16,
    pub wheel: i8,
}

/// Formats the USB serial-number string: `"VKVM"` followed by the four hex
/// nibbles of [`vkvm_protocol::catalog::PROTOCOL_VERSION`].
pub fn serial_number() -> heapless::String<8> {
    let mut s = heapless::String::new();
    let _ = core::fmt::write(&mut s, format_args!("VKVM{:04X}", vkvm_protocol::catalog::PROTOCOL_VERSION));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_number_embeds_the_protocol_version() {
        assert_eq!(serial_number().as_str(), "VKVM0100");
    }

    #[test]
    fn keyboard_report_defaults_to_all_zero() {
        let report = KeyboardReport::default();
        assert_eq!(report.modifier, 0);
        assert_eq!(report.keys, [0; 6]);
    }
}

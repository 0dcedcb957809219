use nom::{
    bytes::complete::take,
    error::{Error, ErrorKind},
    multi::count,
    number::complete::{be_i16, be_i32, be_i8, be_u16, be_u8},
    Err, IResult,
};

use crate::code_attribute::opcodes::*;
use crate::code_attribute::types::*;

fn implicit_local(opcode: u8) -> Option<u16> {
    match opcode {
        ILOAD_0..=ALOAD_3 => Some(u16::from((opcode - ILOAD_0) % 4)),
        ISTORE_0..=ASTORE_3 => Some(u16::from((opcode - ISTORE_0) % 4)),
        _ => None,
    }
}

/// Maps `iload_2` to `iload`, `astore_0` to `astore` and so on.
pub fn normalize_opcode(opcode: u8) -> u8 {
    match opcode {
        ILOAD_0..=ALOAD_3 => ILOAD + (opcode - ILOAD_0) / 4,
        ISTORE_0..=ASTORE_3 => ISTORE + (opcode - ISTORE_0) / 4,
        _ => opcode,
    }
}

fn wide_parser(input: &[u8]) -> IResult<&[u8], (u8, Operand)> {
    let (input, opcode) = be_u8(input)?;
    match opcode {
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
            let (input, index) = be_u16(input)?;
            Ok((input, (opcode, Operand::Local(index))))
        }
        IINC => {
            let (input, index) = be_u16(input)?;
            let (input, value) = be_i16(input)?;
            Ok((input, (opcode, Operand::Iinc { index, value })))
        }
        _ => Err(Err::Failure(Error::new(input, ErrorKind::Tag))),
    }
}

fn switch_padding(address: u32) -> usize {
    ((4 - (address + 1) % 4) % 4) as usize
}

fn pair_parser(input: &[u8]) -> IResult<&[u8], (i32, i32)> {
    let (input, key) = be_i32(input)?;
    let (input, offset) = be_i32(input)?;
    Ok((input, (key, offset)))
}

/// Decodes one instruction located at `address` in the code array.
pub fn instruction_parser(input: &[u8], address: u32) -> IResult<&[u8], Bytecode> {
    let start_len = input.len();
    let (input, raw) = be_u8(input)?;
    let (input, opcode, operand) = match raw {
        NOP..=DCONST_1
        | IALOAD..=SALOAD
        | IASTORE..=LXOR
        | I2L..=DCMPG
        | IRETURN..=RETURN
        | ARRAYLENGTH
        | ATHROW
        | MONITORENTER
        | MONITOREXIT => (input, raw, Operand::None),
        BIPUSH => {
            let (input, v) = be_i8(input)?;
            (input, raw, Operand::Int(i32::from(v)))
        }
        SIPUSH => {
            let (input, v) = be_i16(input)?;
            (input, raw, Operand::Int(i32::from(v)))
        }
        LDC => {
            let (input, index) = be_u8(input)?;
            (input, raw, Operand::ConstantIndex(u16::from(index)))
        }
        LDC_W | LDC2_W | GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST
        | INSTANCEOF => {
            let (input, index) = be_u16(input)?;
            (input, raw, Operand::ConstantIndex(index))
        }
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
            let (input, index) = be_u8(input)?;
            (input, raw, Operand::Local(u16::from(index)))
        }
        ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 => {
            let index = implicit_local(raw).unwrap_or_default();
            (input, normalize_opcode(raw), Operand::Local(index))
        }
        IINC => {
            let (input, index) = be_u8(input)?;
            let (input, value) = be_i8(input)?;
            (
                input,
                raw,
                Operand::Iinc {
                    index: u16::from(index),
                    value: i16::from(value),
                },
            )
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let (input, delta) = be_i16(input)?;
            (input, raw, Operand::Branch(i32::from(delta)))
        }
        GOTO_W | JSR_W => {
            let (input, delta) = be_i32(input)?;
            (input, raw, Operand::Branch(delta))
        }
        TABLESWITCH => {
            let (input, _) = take(switch_padding(address))(input)?;
            let (input, default) = be_i32(input)?;
            let (input, low) = be_i32(input)?;
            let (input, high) = be_i32(input)?;
            if high < low {
                return Err(Err::Failure(Error::new(input, ErrorKind::Verify)));
            }
            let (input, offsets) = count(be_i32, (high as i64 - low as i64 + 1) as usize)(input)?;
            (
                input,
                raw,
                Operand::TableSwitch {
                    default,
                    low,
                    high,
                    offsets,
                },
            )
        }
        LOOKUPSWITCH => {
            let (input, _) = take(switch_padding(address))(input)?;
            let (input, default) = be_i32(input)?;
            let (input, npairs) = be_i32(input)?;
            if npairs < 0 {
                return Err(Err::Failure(Error::new(input, ErrorKind::Verify)));
            }
            let (input, pairs) = count(pair_parser, npairs as usize)(input)?;
            (input, raw, Operand::LookupSwitch { default, pairs })
        }
        INVOKEINTERFACE => {
            let (input, index) = be_u16(input)?;
            let (input, arg_count) = be_u8(input)?;
            let (input, _) = be_u8(input)?;
            (
                input,
                raw,
                Operand::InvokeInterface {
                    index,
                    count: arg_count,
                },
            )
        }
        INVOKEDYNAMIC => {
            let (input, index) = be_u16(input)?;
            let (input, _) = be_u16(input)?;
            (input, raw, Operand::InvokeDynamic(index))
        }
        NEWARRAY => {
            let (input, atype) = be_u8(input)?;
            (input, raw, Operand::NewArray(atype))
        }
        MULTIANEWARRAY => {
            let (input, index) = be_u16(input)?;
            let (input, dimensions) = be_u8(input)?;
            (input, raw, Operand::MultiANewArray { index, dimensions })
        }
        WIDE => {
            let (input, (opcode, operand)) = wide_parser(input)?;
            (input, opcode, operand)
        }
        _ => return Err(Err::Failure(Error::new(input, ErrorKind::Tag))),
    };
    let length = (start_len - input.len()) as u32;
    Ok((
        input,
        Bytecode {
            offset: address,
            opcode,
            operand,
            length,
        },
    ))
}

/// Decodes a whole code array.
pub fn code_parser(code: &[u8]) -> IResult<&[u8], Vec<Bytecode>> {
    let mut instructions = Vec::new();
    let mut input = code;
    let mut address = 0u32;
    while !input.is_empty() {
        let (rest, instruction) = instruction_parser(input, address)?;
        address += instruction.length;
        input = rest;
        instructions.push(instruction);
    }
    Ok((input, instructions))
}

//! AudioUnit effect hosting
//!
//! Resolves an [`EffectKind`] through the AudioComponent registry and runs
//! the resulting AudioUnit as an [`EffectUnit`]. Input is handed to the unit
//! through a render callback; output is pulled with `AudioUnitRender`.

use super::{EffectInstantiator, EffectKind, EffectUnit};
use crate::audio::{AudioBuffer, MAX_CHANNELS, MAX_FRAMES};
use crate::error::EffectError;
use crate::format::FormatDescriptor;
use crate::params::{
    Parameter, ParameterAddress, ParameterNode, ParameterSlot, ParameterSource, ParameterTree,
};
use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use std::ffi::CStr;
use std::os::raw::c_void;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, warn};

// AudioToolbox bindings
#[allow(non_upper_case_globals)]
#[allow(non_camel_case_types)]
#[allow(non_snake_case)]
#[allow(dead_code)]
mod bindings {
    use core_foundation::string::CFStringRef;
    use std::os::raw::{c_char, c_void};

    pub type OSStatus = i32;
    pub type AudioComponent = *mut c_void;
    pub type AudioComponentInstance = *mut c_void;
    pub type AudioUnit = AudioComponentInstance;

    pub const noErr: OSStatus = 0;

    pub const kAudioUnitProperty_ParameterList: u32 = 3;
    pub const kAudioUnitProperty_ParameterInfo: u32 = 4;
    pub const kAudioUnitProperty_StreamFormat: u32 = 8;
    pub const kAudioUnitProperty_MaximumFramesPerSlice: u32 = 14;
    pub const kAudioUnitProperty_SetRenderCallback: u32 = 23;

    pub const kAudioUnitScope_Global: u32 = 0;
    pub const kAudioUnitScope_Input: u32 = 1;
    pub const kAudioUnitScope_Output: u32 = 2;

    pub const kAudioFormatLinearPCM: u32 = 0x6C70636D; // 'lpcm'
    pub const kAudioFormatFlagIsFloat: u32 = 1 << 0;
    pub const kAudioFormatFlagIsPacked: u32 = 1 << 3;
    pub const kAudioFormatFlagIsNonInterleaved: u32 = 1 << 5;

    pub const kAudioTimeStampSampleTimeValid: u32 = 1 << 0;

    pub const kAudioUnitParameterFlag_CFNameRelease: u32 = 1 << 4;
    pub const kAudioUnitParameterFlag_HasCFNameString: u32 = 1 << 27;

    pub const kAudioUnitParameterUnit_Percent: u32 = 3;
    pub const kAudioUnitParameterUnit_Seconds: u32 = 4;
    pub const kAudioUnitParameterUnit_Hertz: u32 = 8;
    pub const kAudioUnitParameterUnit_Decibels: u32 = 13;
    pub const kAudioUnitParameterUnit_Milliseconds: u32 = 24;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AudioComponentDescription {
        pub componentType: u32,
        pub componentSubType: u32,
        pub componentManufacturer: u32,
        pub componentFlags: u32,
        pub componentFlagsMask: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AudioStreamBasicDescription {
        pub mSampleRate: f64,
        pub mFormatID: u32,
        pub mFormatFlags: u32,
        pub mBytesPerPacket: u32,
        pub mFramesPerPacket: u32,
        pub mBytesPerFrame: u32,
        pub mChannelsPerFrame: u32,
        pub mBitsPerChannel: u32,
        pub mReserved: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct AudioBuffer {
        pub mNumberChannels: u32,
        pub mDataByteSize: u32,
        pub mData: *mut c_void,
    }

    /// Head of a variable-length `AudioBufferList`
    #[repr(C)]
    pub struct AudioBufferList {
        pub mNumberBuffers: u32,
        pub mBuffers: [AudioBuffer; 1],
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SMPTETime {
        pub mSubframes: i16,
        pub mSubframeDivisor: i16,
        pub mCounter: u32,
        pub mType: u32,
        pub mFlags: u32,
        pub mHours: i16,
        pub mMinutes: i16,
        pub mSeconds: i16,
        pub mFrames: i16,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AudioTimeStamp {
        pub mSampleTime: f64,
        pub mHostTime: u64,
        pub mRateScalar: f64,
        pub mWordClockTime: u64,
        pub mSMPTETime: SMPTETime,
        pub mFlags: u32,
        pub mReserved: u32,
    }

    pub type AURenderCallback = extern "C" fn(
        inRefCon: *mut c_void,
        ioActionFlags: *mut u32,
        inTimeStamp: *const AudioTimeStamp,
        inBusNumber: u32,
        inNumberFrames: u32,
        ioData: *mut AudioBufferList,
    ) -> OSStatus;

    #[repr(C)]
    pub struct AURenderCallbackStruct {
        pub inputProc: AURenderCallback,
        pub inputProcRefCon: *mut c_void,
    }

    #[repr(C)]
    pub struct AudioUnitParameterInfo {
        pub name: [c_char; 52],
        pub unitName: CFStringRef,
        pub clumpID: u32,
        pub cfNameString: CFStringRef,
        pub unit: u32,
        pub minValue: f32,
        pub maxValue: f32,
        pub defaultValue: f32,
        pub flags: u32,
    }

    #[link(name = "AudioToolbox", kind = "framework")]
    extern "C" {
        pub fn AudioComponentFindNext(
            inComponent: AudioComponent,
            inDesc: *const AudioComponentDescription,
        ) -> AudioComponent;

        pub fn AudioComponentCopyName(
            inComponent: AudioComponent,
            outName: *mut CFStringRef,
        ) -> OSStatus;

        pub fn AudioComponentInstanceNew(
            inComponent: AudioComponent,
            outInstance: *mut AudioComponentInstance,
        ) -> OSStatus;

        pub fn AudioComponentInstanceDispose(inInstance: AudioComponentInstance) -> OSStatus;

        pub fn AudioUnitInitialize(inUnit: AudioUnit) -> OSStatus;

        pub fn AudioUnitUninitialize(inUnit: AudioUnit) -> OSStatus;

        pub fn AudioUnitReset(inUnit: AudioUnit, inScope: u32, inElement: u32) -> OSStatus;

        pub fn AudioUnitGetPropertyInfo(
            inUnit: AudioUnit,
            inID: u32,
            inScope: u32,
            inElement: u32,
            outDataSize: *mut u32,
            outWritable: *mut u8,
        ) -> OSStatus;

        pub fn AudioUnitGetProperty(
            inUnit: AudioUnit,
            inID: u32,
            inScope: u32,
            inElement: u32,
            outData: *mut c_void,
            ioDataSize: *mut u32,
        ) -> OSStatus;

        pub fn AudioUnitSetProperty(
            inUnit: AudioUnit,
            inID: u32,
            inScope: u32,
            inElement: u32,
            inData: *const c_void,
            inDataSize: u32,
        ) -> OSStatus;

        pub fn AudioUnitGetParameter(
            inUnit: AudioUnit,
            inID: u32,
            inScope: u32,
            inElement: u32,
            outValue: *mut f32,
        ) -> OSStatus;

        pub fn AudioUnitSetParameter(
            inUnit: AudioUnit,
            inID: u32,
            inScope: u32,
            inElement: u32,
            inValue: f32,
            inBufferOffsetInFrames: u32,
        ) -> OSStatus;

        pub fn AudioUnitRender(
            inUnit: AudioUnit,
            ioActionFlags: *mut u32,
            inTimeStamp: *const AudioTimeStamp,
            inOutputBusNumber: u32,
            inNumberFrames: u32,
            ioData: *mut AudioBufferList,
        ) -> OSStatus;
    }
}

use bindings::{
    noErr, AudioComponentDescription, AudioComponentInstance, AudioStreamBasicDescription,
    OSStatus,
};

fn check(call: &'static str, status: OSStatus) -> Result<(), EffectError> {
    if status == noErr {
        Ok(())
    } else {
        Err(EffectError::Host { call, status })
    }
}

/// Owned AudioUnit instance, disposed on drop
struct AuInstance {
    unit: AudioComponentInstance,
}

// The AudioUnit API is callable from any thread; the render path and the
// control plane each touch disjoint state (render vs. parameters/properties)
unsafe impl Send for AuInstance {}
unsafe impl Sync for AuInstance {}

impl Drop for AuInstance {
    fn drop(&mut self) {
        unsafe {
            if !self.unit.is_null() {
                bindings::AudioUnitUninitialize(self.unit);
                bindings::AudioComponentInstanceDispose(self.unit);
            }
        }
    }
}

/// Resolves kinds through `AudioComponentFindNext`
#[derive(Debug, Default)]
pub struct AudioComponentInstantiator;

impl AudioComponentInstantiator {
    pub fn new() -> Self {
        Self
    }
}

impl EffectInstantiator for AudioComponentInstantiator {
    fn instantiate(&self, kind: &EffectKind) -> Option<Box<dyn EffectUnit>> {
        let desc = AudioComponentDescription {
            componentType: kind.component_type.0,
            componentSubType: kind.sub_type.0,
            componentManufacturer: kind.manufacturer.0,
            componentFlags: 0,
            componentFlagsMask: 0,
        };

        unsafe {
            let component = bindings::AudioComponentFindNext(ptr::null_mut(), &desc);
            if component.is_null() {
                debug!(kind = %kind, "no effect component matches");
                return None;
            }

            let mut name_ref: CFStringRef = ptr::null();
            let name = if bindings::AudioComponentCopyName(component, &mut name_ref) == noErr
                && !name_ref.is_null()
            {
                CFString::wrap_under_create_rule(name_ref).to_string()
            } else {
                kind.to_string()
            };

            let mut instance: AudioComponentInstance = ptr::null_mut();
            let status = bindings::AudioComponentInstanceNew(component, &mut instance);
            if status != noErr || instance.is_null() {
                warn!(kind = %kind, status, "effect component failed to instantiate");
                return None;
            }

            let status = bindings::AudioUnitInitialize(instance);
            if status != noErr {
                warn!(kind = %kind, status, "effect component failed to initialize");
                bindings::AudioComponentInstanceDispose(instance);
                return None;
            }

            debug!(kind = %kind, name = %name, "audio unit instantiated");
            Some(Box::new(AudioUnitEffect::new(
                name,
                *kind,
                Arc::new(AuInstance { unit: instance }),
            )))
        }
    }
}

/// Parameter view of an AudioUnit
///
/// Units may populate their parameter list some time after initialization,
/// so the list is re-queried on each request until it comes back non-empty.
struct AuParameters {
    instance: Arc<AuInstance>,
    slot: ParameterSlot,
}

impl AuParameters {
    fn query(&self) -> Vec<ParameterNode> {
        let unit = self.instance.unit;
        let mut size: u32 = 0;
        let mut writable: u8 = 0;
        let status = unsafe {
            bindings::AudioUnitGetPropertyInfo(
                unit,
                bindings::kAudioUnitProperty_ParameterList,
                bindings::kAudioUnitScope_Global,
                0,
                &mut size,
                &mut writable,
            )
        };
        if status != noErr || size == 0 {
            return Vec::new();
        }

        let mut ids = vec![0u32; size as usize / std::mem::size_of::<u32>()];
        let status = unsafe {
            bindings::AudioUnitGetProperty(
                unit,
                bindings::kAudioUnitProperty_ParameterList,
                bindings::kAudioUnitScope_Global,
                0,
                ids.as_mut_ptr() as *mut c_void,
                &mut size,
            )
        };
        if status != noErr {
            return Vec::new();
        }
        ids.truncate(size as usize / std::mem::size_of::<u32>());

        ids.into_iter()
            .filter_map(|id| self.parameter(id))
            .map(ParameterNode::from)
            .collect()
    }

    fn parameter(&self, id: u32) -> Option<Parameter> {
        let unit = self.instance.unit;
        let mut info: bindings::AudioUnitParameterInfo = unsafe { std::mem::zeroed() };
        let mut size = std::mem::size_of::<bindings::AudioUnitParameterInfo>() as u32;
        let status = unsafe {
            bindings::AudioUnitGetProperty(
                unit,
                bindings::kAudioUnitProperty_ParameterInfo,
                bindings::kAudioUnitScope_Global,
                id,
                &mut info as *mut _ as *mut c_void,
                &mut size,
            )
        };
        if status != noErr {
            return None;
        }

        let name = if info.flags & bindings::kAudioUnitParameterFlag_HasCFNameString != 0
            && !info.cfNameString.is_null()
        {
            let cf = unsafe {
                if info.flags & bindings::kAudioUnitParameterFlag_CFNameRelease != 0 {
                    CFString::wrap_under_create_rule(info.cfNameString)
                } else {
                    CFString::wrap_under_get_rule(info.cfNameString)
                }
            };
            cf.to_string()
        } else {
            unsafe { CStr::from_ptr(info.name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        };

        let mut current = info.defaultValue;
        unsafe {
            bindings::AudioUnitGetParameter(
                unit,
                id,
                bindings::kAudioUnitScope_Global,
                0,
                &mut current,
            );
        }

        Some(
            Parameter::new(
                id as ParameterAddress,
                id.to_string(),
                name,
                info.minValue,
                info.maxValue,
                current,
            )
            .with_unit(unit_label(info.unit)),
        )
    }
}

impl ParameterSource for AuParameters {
    fn parameter_tree(&self) -> Option<Arc<ParameterTree>> {
        if let Some(tree) = self.slot.load() {
            if !tree.is_empty() {
                return Some(tree);
            }
        }
        let nodes = self.query();
        if nodes.is_empty() {
            return None;
        }
        Some(self.slot.publish(ParameterTree::new(nodes)))
    }

    /// Set the value on the unit right away; render does not have to run
    fn write(&self, address: ParameterAddress, value: f32) -> Option<f32> {
        let tree = self.parameter_tree()?;
        let parameter = tree.parameter(address)?;
        let applied = parameter.set_value(value);
        let status = unsafe {
            bindings::AudioUnitSetParameter(
                self.instance.unit,
                address as u32,
                bindings::kAudioUnitScope_Global,
                0,
                applied,
                0,
            )
        };
        if status == noErr {
            parameter.take_dirty();
        } else {
            // left dirty so the next render quantum retries
            warn!(address, status, "AudioUnitSetParameter failed");
        }
        Some(applied)
    }

    fn read(&self, address: ParameterAddress) -> Option<f32> {
        let tree = self.parameter_tree()?;
        let parameter = tree.parameter(address)?;
        let mut value = parameter.value();
        let status = unsafe {
            bindings::AudioUnitGetParameter(
                self.instance.unit,
                address as u32,
                bindings::kAudioUnitScope_Global,
                0,
                &mut value,
            )
        };
        if status == noErr {
            parameter.sync_value(value);
        }
        Some(parameter.value())
    }
}

fn unit_label(unit: u32) -> &'static str {
    match unit {
        bindings::kAudioUnitParameterUnit_Percent => "%",
        bindings::kAudioUnitParameterUnit_Seconds => "s",
        bindings::kAudioUnitParameterUnit_Hertz => "Hz",
        bindings::kAudioUnitParameterUnit_Decibels => "dB",
        bindings::kAudioUnitParameterUnit_Milliseconds => "ms",
        _ => "",
    }
}

/// Samples handed to the unit's input callback
struct InputStage {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

extern "C" fn render_input(
    in_ref_con: *mut c_void,
    _io_action_flags: *mut u32,
    _in_time_stamp: *const bindings::AudioTimeStamp,
    _in_bus_number: u32,
    in_number_frames: u32,
    io_data: *mut bindings::AudioBufferList,
) -> OSStatus {
    if in_ref_con.is_null() || io_data.is_null() {
        return noErr;
    }
    unsafe {
        let stage = &*(in_ref_con as *const InputStage);
        let list = &mut *io_data;
        let buffers = std::slice::from_raw_parts_mut(
            list.mBuffers.as_mut_ptr(),
            list.mNumberBuffers as usize,
        );
        let frames = (in_number_frames as usize).min(stage.frames);
        for (buffer, channel) in buffers.iter_mut().zip(&stage.channels) {
            if buffer.mData.is_null() {
                buffer.mData = channel.as_ptr() as *mut c_void;
            } else {
                let out = std::slice::from_raw_parts_mut(buffer.mData as *mut f32, frames);
                out.copy_from_slice(&channel[..frames]);
            }
            buffer.mDataByteSize = (frames * std::mem::size_of::<f32>()) as u32;
        }
    }
    noErr
}

/// `AudioBufferList` with room for every channel
#[repr(C)]
struct ChannelBufferList {
    number_buffers: u32,
    buffers: [bindings::AudioBuffer; MAX_CHANNELS],
}

/// An AudioUnit running as an effect
pub struct AudioUnitEffect {
    name: String,
    kind: EffectKind,
    instance: Arc<AuInstance>,
    parameters: Arc<AuParameters>,
    input: Box<InputStage>,
    output: Vec<Vec<f32>>,
    sample_time: f64,
}

impl AudioUnitEffect {
    fn new(name: String, kind: EffectKind, instance: Arc<AuInstance>) -> Self {
        let parameters = Arc::new(AuParameters {
            instance: instance.clone(),
            slot: ParameterSlot::new(),
        });
        Self {
            name,
            kind,
            instance,
            parameters,
            input: Box::new(InputStage {
                channels: Vec::new(),
                frames: 0,
            }),
            output: Vec::new(),
            sample_time: 0.0,
        }
    }

    fn set_property<T>(&self, call: &'static str, id: u32, scope: u32, value: &T)
        -> Result<(), EffectError>
    {
        let status = unsafe {
            bindings::AudioUnitSetProperty(
                self.instance.unit,
                id,
                scope,
                0,
                value as *const T as *const c_void,
                std::mem::size_of::<T>() as u32,
            )
        };
        check(call, status)
    }

    /// Push values written since the last quantum into the unit
    fn push_dirty_parameters(&self) {
        let Some(tree) = self.parameters.slot.load() else {
            return;
        };
        for parameter in tree.all_parameters() {
            if parameter.take_dirty() {
                unsafe {
                    bindings::AudioUnitSetParameter(
                        self.instance.unit,
                        parameter.address() as u32,
                        bindings::kAudioUnitScope_Global,
                        0,
                        parameter.value(),
                        0,
                    );
                }
            }
        }
    }
}

impl EffectUnit for AudioUnitEffect {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn supports_format(&self, format: &FormatDescriptor) -> bool {
        format.is_valid() && format.channels() <= MAX_CHANNELS
    }

    fn allocate(&mut self, format: &FormatDescriptor) -> Result<(), EffectError> {
        if !self.supports_format(format) {
            return Err(EffectError::UnsupportedFormat(*format));
        }
        let channels = format.channels();
        let sample_bytes = std::mem::size_of::<f32>() as u32;
        let asbd = AudioStreamBasicDescription {
            mSampleRate: format.sample_rate,
            mFormatID: bindings::kAudioFormatLinearPCM,
            mFormatFlags: bindings::kAudioFormatFlagIsFloat
                | bindings::kAudioFormatFlagIsPacked
                | bindings::kAudioFormatFlagIsNonInterleaved,
            mBytesPerPacket: sample_bytes,
            mFramesPerPacket: 1,
            mBytesPerFrame: sample_bytes,
            mChannelsPerFrame: channels as u32,
            mBitsPerChannel: 32,
            mReserved: 0,
        };

        unsafe {
            bindings::AudioUnitUninitialize(self.instance.unit);
        }
        self.set_property(
            "AudioUnitSetProperty(StreamFormat, input)",
            bindings::kAudioUnitProperty_StreamFormat,
            bindings::kAudioUnitScope_Input,
            &asbd,
        )?;
        self.set_property(
            "AudioUnitSetProperty(StreamFormat, output)",
            bindings::kAudioUnitProperty_StreamFormat,
            bindings::kAudioUnitScope_Output,
            &asbd,
        )?;
        self.set_property(
            "AudioUnitSetProperty(MaximumFramesPerSlice)",
            bindings::kAudioUnitProperty_MaximumFramesPerSlice,
            bindings::kAudioUnitScope_Global,
            &(MAX_FRAMES as u32),
        )?;

        self.input.channels = vec![vec![0.0; MAX_FRAMES]; channels];
        self.input.frames = 0;
        self.output = vec![vec![0.0; MAX_FRAMES]; channels];

        let callback = bindings::AURenderCallbackStruct {
            inputProc: render_input,
            inputProcRefCon: &*self.input as *const InputStage as *mut c_void,
        };
        self.set_property(
            "AudioUnitSetProperty(SetRenderCallback)",
            bindings::kAudioUnitProperty_SetRenderCallback,
            bindings::kAudioUnitScope_Input,
            &callback,
        )?;

        check("AudioUnitInitialize", unsafe {
            bindings::AudioUnitInitialize(self.instance.unit)
        })?;
        debug!(name = %self.name, format = %format, "audio unit allocated");
        Ok(())
    }

    fn parameters(&self) -> Arc<dyn ParameterSource> {
        self.parameters.clone()
    }

    fn process(&mut self, channels: &mut [AudioBuffer], frames: usize) {
        let frames = frames.min(MAX_FRAMES);
        let count = channels.len().min(self.output.len());
        if count == 0 || frames == 0 {
            return;
        }
        self.push_dirty_parameters();

        for (stage, buf) in self.input.channels.iter_mut().zip(channels.iter()) {
            let n = frames.min(buf.valid_frames());
            stage[..n].copy_from_slice(&buf.samples()[..n]);
            stage[n..frames].fill(0.0);
        }
        self.input.frames = frames;

        let mut list = ChannelBufferList {
            number_buffers: count as u32,
            buffers: [bindings::AudioBuffer {
                mNumberChannels: 1,
                mDataByteSize: 0,
                mData: ptr::null_mut(),
            }; MAX_CHANNELS],
        };
        for (slot, out) in list.buffers.iter_mut().zip(self.output.iter_mut()).take(count) {
            slot.mDataByteSize = (frames * std::mem::size_of::<f32>()) as u32;
            slot.mData = out.as_mut_ptr() as *mut c_void;
        }

        let timestamp = bindings::AudioTimeStamp {
            mSampleTime: self.sample_time,
            mFlags: bindings::kAudioTimeStampSampleTimeValid,
            ..Default::default()
        };
        let mut flags: u32 = 0;
        let status = unsafe {
            bindings::AudioUnitRender(
                self.instance.unit,
                &mut flags,
                &timestamp,
                0,
                frames as u32,
                &mut list as *mut ChannelBufferList as *mut bindings::AudioBufferList,
            )
        };
        self.sample_time += frames as f64;

        // On failure the input passes through untouched
        if status != noErr {
            return;
        }
        for (buf, slot) in channels.iter_mut().zip(list.buffers.iter()).take(count) {
            if slot.mData.is_null() {
                continue;
            }
            let rendered = unsafe { std::slice::from_raw_parts(slot.mData as *const f32, frames) };
            let n = frames.min(buf.valid_frames());
            buf.samples_mut()[..n].copy_from_slice(&rendered[..n]);
        }
    }

    fn reset(&mut self) {
        unsafe {
            bindings::AudioUnitReset(self.instance.unit, bindings::kAudioUnitScope_Global, 0);
        }
        self.sample_time = 0.0;
    }
}

//! ARMv7-A (Cortex-A9) context frames and context switch.
//!
//! A resumable context on a kernel stack looks like this, lowest address
//! first (the saved stack pointer points at `cpsr`):
//!
//! ```text
//! cpsr  r0 .. r12  lr/pc
//! ```
//!
//! A task that has never run and is unprivileged additionally carries a user
//! frame above it, consumed by the SVC restore trampoline on its way to user
//! mode:
//!
//! ```text
//! r0 .. r12  user sp  entry  user cpsr
//! ```

use bitflags::bitflags;
use rtx_hal::EntryFrame;

bitflags! {
    /// Program status register bits used when fabricating frames.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Psr: u32 {
        /// User mode.
        const MODE_USR = 0x10;
        /// Supervisor mode.
        const MODE_SVC = 0x13;
        /// Thumb state.
        const THUMB = 1 << 5;
        /// FIQs masked.
        const FIQ_MASK = 1 << 6;
        /// IRQs masked.
        const IRQ_MASK = 1 << 7;
    }
}

/// Status word of a fresh unprivileged task: ARM state, interrupts enabled, user mode.
pub const INIT_CPSR_USER: Psr = Psr::MODE_USR;

/// Status word a fresh kernel frame resumes with.
pub const INIT_CPSR_SVC: Psr = Psr::MODE_SVC;

/// General purpose registers r0..r12 saved in each frame.
const GP_REGS: usize = 13;

/// Words in the frame every task gets.
pub const KERNEL_FRAME_WORDS: usize = GP_REGS + 2;

/// Words in the extra frame of an unprivileged task.
pub const USER_FRAME_WORDS: usize = GP_REGS + 3;

/// ARMv7-A backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Armv7a {
    svc_restore: usize,
}

impl Armv7a {
    /// Creates a backend whose unprivileged tasks enter user mode through the
    /// trampoline at `svc_restore`.
    pub const fn new(svc_restore: usize) -> Self {
        Self { svc_restore }
    }

    /// Backend wired to the trampoline linked into this image.
    #[cfg(target_arch = "arm")]
    pub fn for_target() -> Self {
        Self::new(rtx_svc_restore as usize)
    }

    /// Pushes the initial frames for `frame` at the top of `stack` and returns
    /// the address of the lowest pushed word.
    ///
    /// `stack` must hold at least [`KERNEL_FRAME_WORDS`] plus
    /// [`USER_FRAME_WORDS`] words.
    pub fn build_frame(&self, stack: &mut [usize], frame: &EntryFrame) -> usize {
        let mut writer = FrameWriter::new(stack);

        if !frame.privileged {
            writer.push(INIT_CPSR_USER.bits() as usize);
            writer.push(frame.entry);
            writer.push(frame.user_stack_top);
            writer.zeros(GP_REGS);
        }

        writer.push(if frame.privileged {
            frame.entry
        } else {
            self.svc_restore
        });
        writer.zeros(GP_REGS);
        writer.push(INIT_CPSR_SVC.bits() as usize);

        writer.sp()
    }
}

struct FrameWriter<'a> {
    stack: &'a mut [usize],
    top: usize,
}

impl<'a> FrameWriter<'a> {
    fn new(stack: &'a mut [usize]) -> Self {
        let top = stack.len();
        Self { stack, top }
    }

    fn push(&mut self, word: usize) {
        self.top -= 1;
        self.stack[self.top] = word;
    }

    fn zeros(&mut self, count: usize) {
        for _ in 0..count {
            self.push(0);
        }
    }

    fn sp(&self) -> usize {
        self.stack[self.top..].as_ptr() as usize
    }
}

#[cfg(target_arch = "arm")]
mod switch {
    use super::Armv7a;
    use rtx_hal::{ContextSwitch, EntryFrame};

    extern "C" {
        pub(super) fn rtx_svc_restore();
        fn rtx_context_switch(save: *mut usize, restore: usize);
    }

    core::arch::global_asm!(
        r#"
.global rtx_context_switch
rtx_context_switch:
    push    {{r0-r12, lr}}
    mrs     r2, cpsr
    push    {{r2}}
    str     sp, [r0]
    mov     sp, r1
    pop     {{r0}}
    msr     cpsr_cxsf, r0
    pop     {{r0-r12, pc}}

.global rtx_svc_restore
rtx_svc_restore:
    pop     {{r0-r12}}
    ldmia   sp, {{sp}}^
    nop
    ldr     lr, [sp, #8]
    msr     spsr_cxsf, lr
    ldr     lr, [sp, #4]
    add     sp, sp, #12
    movs    pc, lr
"#
    );

    impl ContextSwitch for Armv7a {
        fn build_initial_context(&self, kernel_stack: &mut [usize], frame: &EntryFrame) -> usize {
            self.build_frame(kernel_stack, frame)
        }

        unsafe fn switch(&self, save: *mut usize, restore: usize) {
            // SAFETY: upheld by the caller per the trait contract.
            unsafe { rtx_context_switch(save, restore) }
        }
    }
}

#[cfg(target_arch = "arm")]
use switch::rtx_svc_restore;

//! Denormal suppression for the audio callback

/// Enables flush-to-zero and denormals-are-zero for its lifetime and
/// restores the previous control register on drop.
pub struct ScopedNoDenormals {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    previous: u32,
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl ScopedNoDenormals {
    const FTZ: u32 = 1 << 15;
    const DAZ: u32 = 1 << 6;

    #[inline]
    #[allow(deprecated)]
    pub fn new() -> Self {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::{_mm_getcsr, _mm_setcsr};
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};

        // SAFETY: SSE is baseline on every target this is compiled for, and
        // only the FTZ/DAZ bits are changed.
        let previous = unsafe {
            let csr = _mm_getcsr();
            _mm_setcsr(csr | Self::FTZ | Self::DAZ);
            csr
        };
        Self { previous }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl Drop for ScopedNoDenormals {
    #[inline]
    #[allow(deprecated)]
    fn drop(&mut self) {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::_mm_setcsr;
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::_mm_setcsr;

        // SAFETY: restores the value read in `new`.
        unsafe { _mm_setcsr(self.previous) }
    }
}

/// No-op on targets without an SSE control register.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
impl ScopedNoDenormals {
    #[inline]
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for ScopedNoDenormals {
    fn default() -> Self {
        Self::new()
    }
}

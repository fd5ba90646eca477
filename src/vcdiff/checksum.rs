// Adler-32 of a target window, seeded with 0 instead of the usual 1 so that
// an empty window checksums to 0.

/// Checksum `data` with a zero-seeded Adler-32.
pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::from_checksum(0);
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        // Largest n such that 255n(n+1)/2 + (n+1)(MOD_ADLER-1) fits in u32.
        const NMAX: usize = 5552;
        let mut a: u32 = 0;
        let mut b: u32 = 0;
        for block in data.chunks(NMAX) {
            for &byte in block {
                a += u32::from(byte);
                b += a;
            }
            a %= MOD_ADLER;
            b %= MOD_ADLER;
        }
        (b << 16) | a
    }
}
